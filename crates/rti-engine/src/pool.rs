//! Persistent workers for per-stage jobs.
//!
//! A [`StagePool`] owns `threads` named workers and one job shell per
//! worker. Each [`StagePool::run`] fills shells for stages `0..n` in
//! order through a [`Dispatch`], hands them out over a bounded channel and
//! collects every one of them as it comes back; a shell is reused as soon
//! as it has been collected.
//! Shells carry their own buffers, so a call moves data, never allocates.
//!
//! ```text
//!            ┌──────────── jobs (bounded) ────────────┐
//!  caller ───┤ prepare(k, shell) ─► worker: work(shell) ├──► done ─► collect(k, shell, ok)
//!            └────────────────────────────────────────┘
//! ```
//!
//! Workers catch panics in `work` and report them as
//! [`RtiError::WorkerPanicked`], so a shell is never lost. Dropping the
//! pool closes the job channel and joins every worker.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use smallvec::SmallVec;

use rti_core::ConfigError;

use crate::error::RtiError;

/// Worker handles kept inline before spilling to the heap.
const INLINE_WORKERS: usize = 8;

type Failure = Option<(usize, RtiError)>;

fn keep_lowest(slot: &mut Failure, stage: usize, err: RtiError) {
    if slot.as_ref().is_none_or(|(first, _)| stage < *first) {
        *slot = Some((stage, err));
    }
}

/// Run `work(stage)` for stages `0..stages` on the caller's thread.
///
/// All stages run even if some fail; the error of the lowest failing stage
/// is returned.
pub(crate) fn run_inline<F>(stages: usize, mut work: F) -> Result<(), RtiError>
where
    F: FnMut(usize) -> Result<(), RtiError>,
{
    let mut failure: Failure = None;
    for stage in 0..stages {
        if let Err(e) = work(stage) {
            keep_lowest(&mut failure, stage, e);
        }
    }
    failure.map_or(Ok(()), |(_, e)| Err(e))
}

/// A job shell in flight: the stage it was filled for and the shell.
type Job<J> = (usize, J);
/// A job shell coming back with its outcome.
type Done<J> = (usize, J, Result<(), RtiError>);

/// Persistent worker pool over job shells of type `J`.
pub(crate) struct StagePool<J> {
    jobs: Option<Sender<Job<J>>>,
    done: Receiver<Done<J>>,
    workers: SmallVec<[JoinHandle<()>; INLINE_WORKERS]>,
    free: Vec<J>,
}

impl<J> std::fmt::Debug for StagePool<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePool")
            .field("workers", &self.workers.len())
            .field("free", &self.free.len())
            .finish()
    }
}

impl<J: Send + 'static> StagePool<J> {
    /// Start one worker per shell in `shells`, each running `work` on the
    /// shells it receives.
    pub fn spawn(
        name: &str,
        shells: Vec<J>,
        work: fn(&mut J) -> Result<(), RtiError>,
    ) -> Result<Self, ConfigError> {
        let threads = shells.len();
        let (job_tx, job_rx) = bounded::<Job<J>>(threads);
        let (done_tx, done_rx) = bounded::<Done<J>>(threads);
        let mut workers = SmallVec::new();
        for i in 0..threads {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || worker_loop(jobs, done, work))
                .map_err(|e| ConfigError::WorkerSpawn {
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }
        Ok(Self {
            jobs: Some(job_tx),
            done: done_rx,
            workers,
            free: shells,
        })
    }

    /// Workers in the pool.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Run stages `0..stages` through `dispatch`.
    ///
    /// All stages run even if some fail; the error of the lowest failing
    /// stage is returned.
    pub fn run<D: Dispatch<J>>(&mut self, stages: usize, dispatch: &mut D) -> Result<(), RtiError> {
        let Some(jobs) = self.jobs.as_ref() else {
            return Err(RtiError::WorkerPanicked);
        };
        let mut failure: Failure = None;
        let mut in_flight = 0usize;
        for stage in 0..stages {
            let mut shell = match self.free.pop() {
                Some(shell) => shell,
                None => {
                    in_flight -= 1;
                    receive(&self.done, &mut failure, dispatch)?
                }
            };
            dispatch.prepare(stage, &mut shell);
            if let Err(returned) = jobs.send((stage, shell)) {
                // Every worker is gone.
                self.free.push(returned.into_inner().1);
                return Err(RtiError::WorkerPanicked);
            }
            in_flight += 1;
        }
        while in_flight > 0 {
            in_flight -= 1;
            let shell = receive(&self.done, &mut failure, dispatch)?;
            self.free.push(shell);
        }
        failure.map_or(Ok(()), |(_, e)| Err(e))
    }
}

/// The caller's side of [`StagePool::run`].
pub(crate) trait Dispatch<J> {
    /// Fill `shell` for `stage` before it is sent.
    fn prepare(&mut self, stage: usize, shell: &mut J);

    /// Empty `shell` when it comes back; `ok` tells whether its stage
    /// succeeded.
    fn collect(&mut self, stage: usize, shell: &mut J, ok: bool);
}

fn receive<J, D: Dispatch<J>>(
    done: &Receiver<Done<J>>,
    failure: &mut Failure,
    dispatch: &mut D,
) -> Result<J, RtiError> {
    let (stage, mut shell, result) = done.recv().map_err(|_| RtiError::WorkerPanicked)?;
    dispatch.collect(stage, &mut shell, result.is_ok());
    if let Err(e) = result {
        keep_lowest(failure, stage, e);
    }
    Ok(shell)
}

fn worker_loop<J>(jobs: Receiver<Job<J>>, done: Sender<Done<J>>, work: fn(&mut J) -> Result<(), RtiError>) {
    for (stage, mut shell) in jobs.iter() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| work(&mut shell)))
            .unwrap_or(Err(RtiError::WorkerPanicked));
        if done.send((stage, shell, result)).is_err() {
            return;
        }
    }
}

impl<J> Drop for StagePool<J> {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
