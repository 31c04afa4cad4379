//! Contract with the general-purpose thread scheduler
//!
//! Thread bookkeeping, timekeeping and context switching belong to the
//! scheduler, which sits outside this crate. The primitives here only need
//! the handful of hooks in [`Kernel`].

use crate::types::{CpuMask, Deadline, ThreadId, Tick};

/// Scheduler services consumed by the semaphore and the periodic scheduler.
///
/// `suspend` and `ready` behave like a park token: a `ready` that lands
/// before the matching `suspend` makes that `suspend` return immediately.
/// `suspend` may also return early for no reason at all; callers re-check
/// their own state.
pub trait Kernel: Sync {
    /// Thread running on the calling core
    fn current_thread(&self) -> ThreadId;

    /// Monotonic kernel tick
    fn ticks(&self) -> Tick;

    /// Block the calling thread until [`Kernel::ready`] is called for it or
    /// `deadline` passes. Never called with a spinlock held.
    fn suspend(&self, deadline: Deadline);

    /// Make `thread` runnable again
    fn ready(&self, thread: ThreadId);

    /// Ask the cores in `targets` to re-evaluate their runnable threads.
    ///
    /// Uniprocessor kernels have nothing to signal.
    fn signal_cpus(&self, targets: CpuMask) {
        let _ = targets;
    }

    /// Re-evaluate runnable threads on the calling core.
    ///
    /// Runs from the IPI handler; must be cheap and harmless when nothing
    /// changed.
    fn sched_ipi(&self) {}
}
