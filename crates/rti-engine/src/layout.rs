//! Layout of the single arena behind one solver instance.
//!
//! ```text
//! memory:    [stat | models | qp memory]
//! workspace: [qp_in | qp_out | qp_res | qp scratch | stage 0 | … | stage N]
//! models:    per stage [cost memory | idxb | idxs]
//! stage k:   [value | phi | dyn_jac | grad | hess | h | con_jac] [dyn | cost | reg | con scratch]
//! ```
//!
//! The memory block persists across calls. The workspace block is zeroed
//! before every call unless `reuse_workspace` is set. Linearization and
//! assembly each carve a stage's block out of its own region, so stages
//! can be visited in any order.

use rti_arena::{
    ArenaRef, Carver, Footprint, IndexSpan, Region, Span, SpanPlanner, Store, StoreMut,
};
use rti_core::{QpDims, StageDims};
use rti_qp::{QpBackend, QpIn, QpOut, QpRes};

use crate::stats::StatTable;

// ── Stages ─────────────────────────────────────────────────────────

/// Model-dependent sizes of one stage, read from the models at setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct StageSizes {
    pub dyn_work: Footprint,
    pub cost_work: Footprint,
    pub reg_work: Footprint,
    pub con_work: Footprint,
    /// Reals of cost memory filled by `precompute`.
    pub cost_len: usize,
}

/// Sizes and QP offsets of one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StageShape {
    pub dims: StageDims,
    /// States of the next stage; `0` at the terminal stage.
    pub nx_next: usize,
    /// First QP variable of this stage.
    pub v_off: usize,
    /// First equality row of this interval.
    pub eq_off: usize,
    /// First QP box row.
    pub box_off: usize,
    /// First QP general row.
    pub gen_off: usize,
    /// Start of this stage's block within the stage region.
    pub base: Footprint,
    pub sizes: StageSizes,
}

impl StageShape {
    /// Lay out every stage of `stages` with the given model sizes.
    pub fn plan(stages: &[StageDims], sizes: impl Fn(usize) -> StageSizes) -> Vec<Self> {
        let mut out = Vec::with_capacity(stages.len());
        let (mut v, mut e, mut b, mut g) = (0, 0, 0, 0);
        let mut base = Footprint::ZERO;
        for (k, d) in stages.iter().enumerate() {
            let nx_next = stages.get(k + 1).map_or(0, |s| s.nx);
            let shape = Self {
                dims: *d,
                nx_next,
                v_off: v,
                eq_off: e,
                box_off: b,
                gen_off: g,
                base,
                sizes: sizes(k),
            };
            base += shape.footprint();
            out.push(shape);
            v += d.nv();
            e += nx_next;
            b += d.nb + d.ns;
            g += d.ng + 2 * d.ns;
        }
        out
    }

    pub fn nw(&self) -> usize {
        self.dims.nw()
    }

    fn outputs(&self) -> Footprint {
        let (nw, n1, ng) = (self.nw(), self.nx_next, self.dims.ng);
        Footprint::reals(1)
            + Footprint::reals(n1)
            + Footprint::reals(n1 * nw)
            + Footprint::reals(nw)
            + Footprint::reals(nw * nw)
            + Footprint::reals(ng)
            + Footprint::reals(ng * nw)
    }

    pub fn scratch(&self) -> Footprint {
        let s = &self.sizes;
        s.dyn_work + s.cost_work + s.reg_work + s.con_work
    }

    pub fn footprint(&self) -> Footprint {
        self.outputs() + self.scratch()
    }

    /// This stage's block within the stage region.
    pub fn region(&self) -> Region {
        Region {
            base: self.base,
            footprint: self.footprint(),
        }
    }
}

/// Linearization outputs of one stage.
#[derive(Debug)]
pub(crate) struct StageBuffers<'a> {
    /// Stage cost value, one slot.
    pub value: &'a mut [f64],
    pub phi: &'a mut [f64],
    pub dyn_jac: &'a mut [f64],
    pub grad: &'a mut [f64],
    pub hess: &'a mut [f64],
    pub h: &'a mut [f64],
    pub con_jac: &'a mut [f64],
}

/// Scratch regions of one stage, in carving order.
#[derive(Debug)]
pub(crate) struct StageScratch<'a> {
    pub dynamics: Carver<'a>,
    pub cost: Carver<'a>,
    pub regularizer: Carver<'a>,
    pub constraints: Carver<'a>,
}

impl<'a> StageBuffers<'a> {
    /// Carve the outputs and the scratch of stage `shape` from `c`.
    pub fn carve(c: &mut Carver<'a>, shape: &StageShape) -> (Self, StageScratch<'a>) {
        let (nw, n1, ng) = (shape.nw(), shape.nx_next, shape.dims.ng);
        let bufs = Self {
            value: c.reals(1),
            phi: c.reals(n1),
            dyn_jac: c.reals(n1 * nw),
            grad: c.reals(nw),
            hess: c.reals(nw * nw),
            h: c.reals(ng),
            con_jac: c.reals(ng * nw),
        };
        let s = &shape.sizes;
        let scratch = StageScratch {
            dynamics: c.sub(s.dyn_work),
            cost: c.sub(s.cost_work),
            regularizer: c.sub(s.reg_work),
            constraints: c.sub(s.con_work),
        };
        (bufs, scratch)
    }
}

// ── Model memory ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StageModelSpans {
    cost: Span,
    idxb: IndexSpan,
    idxs: IndexSpan,
}

/// Per-stage model memory filled by `precompute`: each cost's
/// precomputed data and copies of the structural indices `idxb`, `idxs`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ModelMemory<'l, S> {
    spans: &'l [StageModelSpans],
    store: S,
}

impl<'l, S: Store> ModelMemory<'l, S> {
    pub fn assign(spans: &'l [StageModelSpans], store: S) -> Self {
        Self { spans, store }
    }

    pub fn cost(&self, k: usize) -> &[f64] {
        self.store.slice(self.spans[k].cost)
    }

    pub fn idxb(&self, k: usize) -> &[usize] {
        self.store.index_slice(self.spans[k].idxb)
    }

    pub fn idxs(&self, k: usize) -> &[usize] {
        self.store.index_slice(self.spans[k].idxs)
    }
}

impl<S: StoreMut> ModelMemory<'_, S> {
    pub fn cost_mut(&mut self, k: usize) -> &mut [f64] {
        self.store.slice_mut(self.spans[k].cost)
    }

    pub fn set_indices(&mut self, k: usize, idxb: &[usize], idxs: &[usize]) {
        let sp = self.spans[k];
        self.store.index_slice_mut(sp.idxb).copy_from_slice(idxb);
        self.store.index_slice_mut(sp.idxs).copy_from_slice(idxs);
    }
}

/// Model memory read through a shared region view.
pub(crate) type ModelView<'l, 'a> = ModelMemory<'l, ArenaRef<'a>>;

// ── Engine ─────────────────────────────────────────────────────────

/// Every region of one solver's arena, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EngineLayout {
    pub stat_rows: usize,
    pub qp_dims: QpDims,
    pub stat: Region,
    pub models: Region,
    pub qp_memory: Region,
    /// The whole workspace block, for zeroing.
    pub workspace: Region,
    pub qp_in: Region,
    pub qp_out: Region,
    pub qp_res: Region,
    pub qp_work: Region,
    pub stages: Region,
    pub shapes: Vec<StageShape>,
    pub model_spans: Vec<StageModelSpans>,
}

impl EngineLayout {
    /// Plan the arena of a solver with `stat_rows` statistics rows, QP
    /// shape `qp_dims` solved by `backend`, and the given stages.
    pub fn plan(
        stat_rows: usize,
        qp_dims: QpDims,
        backend: &dyn QpBackend,
        stages: &[StageDims],
        sizes: &[StageSizes],
    ) -> Self {
        let shapes = StageShape::plan(stages, |k| sizes[k]);

        let mut models = SpanPlanner::new();
        let model_spans = stages
            .iter()
            .zip(sizes)
            .map(|(d, s)| StageModelSpans {
                cost: models.reals(s.cost_len),
                idxb: models.indices(d.nb),
                idxs: models.indices(d.ns),
            })
            .collect();

        let mut p = SpanPlanner::new();
        let stat = p.region(StatTable::footprint(stat_rows));
        let models = p.region(models.footprint());
        let qp_memory = p.region(backend.memory_footprint(&qp_dims));
        let memory_end = p.footprint();
        let qp_in = p.region(QpIn::footprint(&qp_dims));
        let qp_out = p.region(QpOut::footprint(&qp_dims));
        let qp_res = p.region(QpRes::footprint(&qp_dims));
        let qp_work = p.region(backend.workspace_footprint(&qp_dims));
        let stages = p.region(shapes.iter().map(StageShape::footprint).sum());
        let workspace = Region {
            base: memory_end,
            footprint: Footprint {
                reals: stages.end().reals - memory_end.reals,
                indices: stages.end().indices - memory_end.indices,
            },
        };
        Self {
            stat_rows,
            qp_dims,
            stat,
            models,
            qp_memory,
            workspace,
            qp_in,
            qp_out,
            qp_res,
            qp_work,
            stages,
            shapes,
            model_spans,
        }
    }

    /// Slots of the whole arena.
    pub fn footprint(&self) -> Footprint {
        self.stages.end()
    }

    /// Closed-form size of the same arena, summed part by part.
    pub fn footprint_of(
        stat_rows: usize,
        qp_dims: &QpDims,
        backend: &dyn QpBackend,
        shapes: &[StageShape],
    ) -> Footprint {
        let models: Footprint = shapes
            .iter()
            .map(|s| {
                Footprint::reals(s.sizes.cost_len)
                    + Footprint::indices(s.dims.nb)
                    + Footprint::indices(s.dims.ns)
            })
            .sum();
        let stages: Footprint = shapes.iter().map(StageShape::footprint).sum();
        StatTable::footprint(stat_rows)
            + models
            + backend.memory_footprint(qp_dims)
            + QpIn::footprint(qp_dims)
            + QpOut::footprint(qp_dims)
            + QpRes::footprint(qp_dims)
            + backend.workspace_footprint(qp_dims)
            + stages
    }
}
