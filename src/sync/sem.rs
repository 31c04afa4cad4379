//! Semaphore implementation
//!
//! Counting semaphores for thread synchronization and resource counting.
//!
//! `give` hands the unit straight to the waiter with the earliest deadline
//! instead of bumping the count, so a woken thread can never lose its unit to
//! a third party that gets the lock first. Extra gives at the limit are
//! dropped.

use heapless::Vec;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::CFG_SEM_WAITERS_MAX;
use crate::critical::is_isr_context;
use crate::error::{KError, KResult};
use crate::kernel::Kernel;
use crate::port;
use crate::sync::spinlock::SpinLocked;
use crate::sync::wait_q::{WaitQueue, WakeReason};
use crate::types::{CpuMask, SemCount, ThreadId, Timeout};

/// Largest limit a semaphore can be created with
pub const SEM_MAX_LIMIT: SemCount = SemCount::MAX;

/// Counting semaphore
pub struct Semaphore<'k> {
    kernel: &'k dyn Kernel,
    /// Written only with `waiters` locked
    count: AtomicU32,
    limit: AtomicU32,
    waiters: SpinLocked<WaitQueue<CFG_SEM_WAITERS_MAX>>,
}

impl<'k> Semaphore<'k> {
    /// Create a semaphore
    ///
    /// # Arguments
    /// * `kernel` - Scheduler used to block and wake threads
    /// * `initial` - Initial count
    /// * `limit` - Maximum count
    ///
    /// # Panics
    /// If `limit` is 0 or `initial > limit`. For a `static` this is caught
    /// at compile time.
    pub const fn new(kernel: &'k dyn Kernel, initial: SemCount, limit: SemCount) -> Self {
        assert!(limit != 0, "semaphore limit must be non-zero");
        assert!(initial <= limit, "semaphore initial count above limit");

        Semaphore {
            kernel,
            count: AtomicU32::new(initial),
            limit: AtomicU32::new(limit),
            waiters: SpinLocked::new(WaitQueue::new()),
        }
    }

    /// Re-initialize the semaphore
    ///
    /// # Panics
    /// On invalid arguments, or if threads are still waiting on it.
    pub fn init(&self, initial: SemCount, limit: SemCount) {
        assert!(limit != 0, "semaphore limit must be non-zero");
        assert!(initial <= limit, "semaphore initial count above limit");

        let q = self.waiters.lock();
        assert!(q.is_empty(), "semaphore re-initialized with waiters");
        self.limit.store(limit, Ordering::Relaxed);
        self.count.store(initial, Ordering::Relaxed);
    }

    /// Signal the semaphore
    ///
    /// Wakes the waiter with the earliest deadline if there is one,
    /// otherwise increments the count unless it already sits at the limit.
    /// Safe from ISRs; never blocks.
    pub fn give(&self) {
        let me = port::cpu_id();
        let mut q = self.waiters.lock();

        match q.wake_first(self.kernel.ticks(), WakeReason::Given) {
            Some(waiter) => {
                // The outcome is already in the slot; the waiter collects it
                // under the lock whenever it runs
                drop(q);
                self.kernel.ready(waiter.thread);

                if waiter.cpu != me {
                    self.kernel.signal_cpus(CpuMask::single(waiter.cpu));
                }
            }
            None => {
                let count = self.count.load(Ordering::Relaxed);
                if count < self.limit.load(Ordering::Relaxed) {
                    self.count.store(count + 1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Wait on the semaphore
    ///
    /// # Returns
    /// * `Ok(())` - Semaphore taken
    /// * `Err(KError::Busy)` - `NoWait` and the count is zero
    /// * `Err(KError::Timeout)` - Waiting period elapsed
    /// * `Err(KError::Reset)` - Semaphore was reset while waiting
    /// * `Err(KError::NoSpace)` - Wait queue is full
    ///
    /// # Panics
    /// When called from an ISR with anything but `Timeout::NoWait`.
    pub fn take(&self, timeout: Timeout) -> KResult<()> {
        if timeout != Timeout::NoWait {
            assert!(!is_isr_context(), "blocking semaphore take from ISR");
        }

        let mut q = self.waiters.lock();

        let count = self.count.load(Ordering::Relaxed);
        if count > 0 {
            self.count.store(count - 1, Ordering::Relaxed);
            return Ok(());
        }

        if timeout == Timeout::NoWait {
            return Err(KError::Busy);
        }

        let deadline = timeout.deadline(self.kernel.ticks());
        let thread = self.kernel.current_thread();
        let slot = q
            .enqueue(thread, port::cpu_id(), deadline)
            .ok_or(KError::NoSpace)?;
        drop(q);

        loop {
            self.kernel.suspend(deadline);

            let mut q = self.waiters.lock();
            if let Some(reason) = q.collect(slot) {
                return wake_result(reason);
            }

            if deadline.expired(self.kernel.ticks()) {
                return match q.cancel(slot) {
                    Some(reason) => wake_result(reason),
                    None => Err(KError::Timeout),
                };
            }
            // Spurious resume, keep waiting
        }
    }

    /// Take without waiting
    #[inline]
    pub fn try_take(&self) -> KResult<()> {
        self.take(Timeout::NoWait)
    }

    /// Wake every waiter with `Err(KError::Reset)` and zero the count
    pub fn reset(&self) {
        let me = port::cpu_id();
        let mut targets = CpuMask::EMPTY;
        let mut woken: Vec<ThreadId, CFG_SEM_WAITERS_MAX> = Vec::new();
        let mut q = self.waiters.lock();

        self.count.store(0, Ordering::Relaxed);
        q.wake_all(WakeReason::Reset, |waiter| {
            // Never more waiters than wait-queue slots
            let _ = woken.push(waiter.thread);
            if waiter.cpu != me {
                targets = targets.with(waiter.cpu);
            }
        });
        drop(q);

        for &thread in &woken {
            self.kernel.ready(thread);
        }

        crate::debug!("sem reset, remote cpus {=u32:b}", targets.0);

        if !targets.is_empty() {
            self.kernel.signal_cpus(targets);
        }
    }

    /// Current count
    ///
    /// Racy by nature: the value may be stale by the time the caller looks
    /// at it. Use `take`/`try_take` to act on it.
    #[inline]
    pub fn count_get(&self) -> SemCount {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn limit(&self) -> SemCount {
        self.limit.load(Ordering::Relaxed)
    }

    /// Number of threads blocked on the semaphore
    pub fn waiters(&self) -> usize {
        self.waiters.lock().len()
    }
}

fn wake_result(reason: WakeReason) -> KResult<()> {
    match reason {
        WakeReason::Given => Ok(()),
        WakeReason::Reset => Err(KError::Reset),
    }
}
