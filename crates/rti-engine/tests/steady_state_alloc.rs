//! Integration test: a warm solver allocates nothing per call.
//!
//! The arena, the QP memory and the worker pool are all set up at
//! construction, so once the first call has run every later `step` must
//! stay off the heap, on the calling thread and on the workers alike.
//!
//! The counting allocator is process-wide, so this file holds a single
//! test and measures one window at a time.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rti_core::QpSolverKind;
use rti_test_utils::PendulumSwing;

struct CountingAllocator;

static COUNTING: AtomicBool = AtomicBool::new(false);
static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if COUNTING.load(Ordering::Relaxed) {
            ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        }
        // SAFETY: forwarded unchanged to the system allocator.
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if COUNTING.load(Ordering::Relaxed) {
            ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        }
        // SAFETY: forwarded unchanged to the system allocator.
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if COUNTING.load(Ordering::Relaxed) {
            ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        }
        // SAFETY: forwarded unchanged to the system allocator.
        unsafe { System.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: forwarded unchanged to the system allocator.
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// Heap allocations made anywhere in the process while `f` runs.
fn allocations_during<R>(f: impl FnOnce() -> R) -> (R, usize) {
    ALLOCATIONS.store(0, Ordering::SeqCst);
    COUNTING.store(true, Ordering::SeqCst);
    let out = f();
    COUNTING.store(false, Ordering::SeqCst);
    (out, ALLOCATIONS.load(Ordering::SeqCst))
}

#[test]
fn warm_steps_do_not_allocate() {
    for qp in [QpSolverKind::InteriorPoint, QpSolverKind::Admm] {
        for threads in [1usize, 4] {
            let problem = PendulumSwing::default().problem(qp).unwrap();
            let mut opts = problem.options().unwrap();
            opts.set("num_threads", threads).unwrap();
            let mut solver = problem.solver_with(opts).unwrap();
            let mut out = problem.nlp_out().unwrap();

            solver.step(&problem.nlp_in, &mut out).unwrap();
            let (report, count) = allocations_during(|| solver.step(&problem.nlp_in, &mut out));
            report.unwrap();
            assert_eq!(count, 0, "{qp:?} with {threads} threads allocated {count} times");
        }
    }
}
