//! Fixed-shape per-call statistics.

use rti_arena::{Arena, ArenaRef, Footprint, IndexSpan, Span, SpanPlanner, Store, StoreMut};
use rti_core::ConfigError;

/// Column names of the statistics table, in storage order.
pub const STAT_COLUMNS: [&str; 6] = [
    "qp_status",
    "qp_iter",
    "res_stat",
    "res_eq",
    "res_ineq",
    "res_comp",
];

/// One row of the statistics table.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatRow {
    /// QP status code (see [`Status`](rti_core::Status)).
    pub qp_status: i32,
    /// QP iterations.
    pub qp_iter: usize,
    /// Stationarity residual, or `0.0` without `ext_qp_res`.
    pub res_stat: f64,
    /// Equality residual.
    pub res_eq: f64,
    /// Inequality residual.
    pub res_ineq: f64,
    /// Complementarity residual.
    pub res_comp: f64,
}

impl StatRow {
    fn to_array(self) -> [f64; 6] {
        [
            f64::from(self.qp_status),
            self.qp_iter as f64,
            self.res_stat,
            self.res_eq,
            self.res_ineq,
            self.res_comp,
        ]
    }

    fn from_slice(r: &[f64]) -> Self {
        Self {
            qp_status: r[0] as i32,
            qp_iter: r[1] as usize,
            res_stat: r[2],
            res_eq: r[3],
            res_ineq: r[4],
            res_comp: r[5],
        }
    }
}

/// A `stat_m × stat_n` row-major table written cyclically, one row per
/// call. `stat_n` is always [`STAT_COLUMNS`]`.len()`.
///
/// The rows and the write counter both live in the table's store, so a
/// table placed in a solver's arena survives as long as that arena.
#[derive(Clone, Debug)]
pub struct StatTable<S = Arena> {
    rows: usize,
    data: Span,
    written: IndexSpan,
    arena: S,
}

/// A statistics table read through a shared region view.
pub type StatView<'a> = StatTable<ArenaRef<'a>>;

impl StatTable {
    /// Number of columns.
    pub const COLS: usize = STAT_COLUMNS.len();

    /// Slots needed for `rows` rows.
    pub fn footprint(rows: usize) -> Footprint {
        Footprint::reals(rows * Self::COLS) + Footprint::indices(1)
    }

    /// An all-zero table of `rows` rows.
    pub fn new(rows: usize) -> Result<Self, ConfigError> {
        if rows == 0 {
            return Err(ConfigError::OptionRange {
                field: "stat_rows".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let arena = Arena::with_footprint(Self::footprint(rows))?;
        Ok(Self::assign(rows, arena))
    }
}

impl<S: Store> StatTable<S> {
    /// Lay a table of `rows` rows over `store`, which must hold exactly
    /// [`StatTable::footprint`] slots. Existing rows are kept.
    pub fn assign(rows: usize, store: S) -> Self {
        let mut p = SpanPlanner::new();
        let data = p.reals(rows * StatTable::COLS);
        let written = p.indices(1);
        let fp = p.finish(StatTable::footprint(rows));
        debug_assert_eq!(store.footprint(), fp, "stat store does not match its layout");
        Self {
            rows,
            data,
            written,
            arena: store,
        }
    }

    /// `stat_m`.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// `stat_n`.
    pub fn cols(&self) -> usize {
        StatTable::COLS
    }

    /// Backing storage size in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.arena.memory_bytes()
    }

    /// Rows written since creation, including overwritten ones.
    pub fn written(&self) -> u64 {
        self.arena.index_slice(self.written)[0] as u64
    }

    /// The raw row-major table.
    pub fn as_slice(&self) -> &[f64] {
        self.arena.slice(self.data)
    }

    /// Row `i`. Panics if `i >= rows`.
    pub fn row(&self, i: usize) -> StatRow {
        let c = StatTable::COLS;
        StatRow::from_slice(&self.as_slice()[i * c..(i + 1) * c])
    }

    /// The most recently written row.
    pub fn last(&self) -> Option<StatRow> {
        let n = self.written().checked_sub(1)?;
        Some(self.row((n % self.rows as u64) as usize))
    }
}

impl<S: StoreMut> StatTable<S> {
    /// Write the next row, wrapping after `rows`.
    pub fn push(&mut self, row: StatRow) {
        let c = StatTable::COLS;
        let written = self.arena.index_slice(self.written)[0];
        let i = written % self.rows;
        self.arena.slice_mut(self.data)[i * c..(i + 1) * c].copy_from_slice(&row.to_array());
        self.arena.index_slice_mut(self.written)[0] = written + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(iter: usize) -> StatRow {
        StatRow {
            qp_iter: iter,
            ..StatRow::default()
        }
    }

    #[test]
    fn rows_cycle() {
        let mut t = StatTable::new(2).unwrap();
        assert_eq!(t.last(), None);
        t.push(row(1));
        t.push(row(2));
        t.push(row(3));
        assert_eq!(t.row(0).qp_iter, 3);
        assert_eq!(t.row(1).qp_iter, 2);
        assert_eq!(t.last(), Some(row(3)));
        assert_eq!(t.written(), 3);
    }

    #[test]
    fn shape_is_fixed() {
        let t = StatTable::new(3).unwrap();
        assert_eq!((t.rows(), t.cols()), (3, 6));
        assert_eq!(t.as_slice().len(), 18);
        assert!(StatTable::new(0).is_err());
    }

    #[test]
    fn placed_table_keeps_its_counter_in_the_store() {
        let mut p = SpanPlanner::new();
        let _before = p.region(Footprint::reals(3));
        let region = p.region(StatTable::footprint(2));
        let mut arena = Arena::with_footprint(p.footprint()).unwrap();
        StatTable::assign(2, arena.region_mut(region)).push(row(5));
        StatTable::assign(2, arena.region_mut(region)).push(row(6));
        let view: StatView<'_> = StatTable::assign(2, arena.region(region));
        assert_eq!(view.written(), 2);
        assert_eq!(view.last(), Some(row(6)));
        assert_eq!(view.memory_bytes(), StatTable::footprint(2).bytes());
    }

    #[test]
    fn columns_keep_their_order() {
        let mut t = StatTable::new(1).unwrap();
        t.push(StatRow {
            qp_status: 3,
            qp_iter: 12,
            res_stat: 1e-3,
            res_eq: 2e-3,
            res_ineq: 3e-3,
            res_comp: 4e-3,
        });
        assert_eq!(t.as_slice(), &[3.0, 12.0, 1e-3, 2e-3, 3e-3, 4e-3]);
    }
}
