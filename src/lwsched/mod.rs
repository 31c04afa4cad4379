//! Lightweight periodic scheduler
//!
//! Many short, low-priority, non-preemptible jobs sharing one host thread
//! instead of a thread each. Once per fixed interval the host thread walks
//! the task table and calls `execute` on every running task.
//!
//! Task states:
//!
//! ```text
//! Stopped --start--> Running <--start/pause--> Paused
//!    \                  |                        /
//!     +-------------- abort --> Aborted <-------+
//! ```

mod task;

pub use task::{LwTaskId, LwTaskOps, LwTaskState, LwTaskStats};

use portable_atomic::{AtomicU64, AtomicU8, Ordering};

use crate::config::CFG_LWSCHED_TICK_DEFAULT;
use crate::error::{KError, KResult};
use crate::kernel::Kernel;
use crate::sync::sem::Semaphore;
use crate::sync::spinlock::SpinLocked;
use crate::types::{Tick, Timeout};
use task::TaskTable;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LwSchedState {
    /// Created, host thread waiting for `start`
    Idle = 0,
    Running = 1,
    Aborted = 2,
}

impl LwSchedState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => LwSchedState::Running,
            2 => LwSchedState::Aborted,
            _ => LwSchedState::Idle,
        }
    }
}

/// Cooperative scheduler running a task table at a fixed interval
pub struct LwScheduler<'a> {
    kernel: &'a dyn Kernel,
    interval: u32,
    state: AtomicU8,
    /// Tick of the first pass, set by `start`
    first_tick: AtomicU64,
    tasks: SpinLocked<TaskTable<'a>>,
    /// Released by `start`/`abort` while the host thread waits to begin
    start_sem: Semaphore<'a>,
    /// Cuts the host thread's sleep short on `abort`
    wake_sem: Semaphore<'a>,
}

impl<'a> LwScheduler<'a> {
    /// Scheduler ticking every `interval` kernel ticks
    pub const fn new(kernel: &'a dyn Kernel, interval: u32) -> Self {
        assert!(interval > 0, "lwsched interval must be non-zero");

        LwScheduler {
            kernel,
            interval,
            state: AtomicU8::new(LwSchedState::Idle as u8),
            first_tick: AtomicU64::new(0),
            tasks: SpinLocked::new(TaskTable::new()),
            start_sem: Semaphore::new(kernel, 0, 1),
            wake_sem: Semaphore::new(kernel, 0, 1),
        }
    }

    /// Scheduler ticking every [`CFG_LWSCHED_TICK_DEFAULT`] kernel ticks
    pub const fn with_default_interval(kernel: &'a dyn Kernel) -> Self {
        Self::new(kernel, CFG_LWSCHED_TICK_DEFAULT)
    }

    #[inline]
    pub fn interval(&self) -> u32 {
        self.interval
    }

    #[inline]
    pub fn state(&self) -> LwSchedState {
        LwSchedState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Begin ticking, first pass `initial_delay` ticks from now
    pub fn start(&self, initial_delay: u32) -> KResult<()> {
        if self.state() != LwSchedState::Idle {
            return Err(KError::Already);
        }

        let first = self.kernel.ticks() + initial_delay as Tick;
        self.first_tick.store(first, Ordering::Relaxed);

        self.state
            .compare_exchange(
                LwSchedState::Idle as u8,
                LwSchedState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| KError::Already)?;

        crate::info!("lwsched start, interval {=u32}", self.interval);
        self.start_sem.give();
        Ok(())
    }

    /// Stop the host thread.
    ///
    /// Tasks simply stop being called; no abort handler runs.
    pub fn abort(&self) -> KResult<()> {
        let prev = self.state.swap(LwSchedState::Aborted as u8, Ordering::AcqRel);
        if prev == LwSchedState::Aborted as u8 {
            return Err(KError::Already);
        }

        crate::info!("lwsched abort");
        self.start_sem.give();
        self.wake_sem.give();
        Ok(())
    }

    /// Host thread body. Waits for `start`, then ticks on a fixed grid
    /// until `abort`.
    pub fn run(&self) {
        loop {
            match self.state() {
                LwSchedState::Running => break,
                LwSchedState::Aborted => return,
                LwSchedState::Idle => {
                    let _ = self.start_sem.take(Timeout::Forever);
                }
            }
        }

        let mut next = self.first_tick.load(Ordering::Relaxed);
        loop {
            if !self.sleep_until(next) {
                return;
            }

            self.tick();

            next += self.interval as Tick;
            let now = self.kernel.ticks();
            if now >= next {
                // Overran: drop the missed passes rather than bursting
                let behind = (now - next) / self.interval as Tick + 1;
                next += behind * self.interval as Tick;
            }
        }
    }

    /// Sleep until tick `at`; false once aborted
    fn sleep_until(&self, at: Tick) -> bool {
        loop {
            if self.state() == LwSchedState::Aborted {
                return false;
            }
            let now = self.kernel.ticks();
            if now >= at {
                return true;
            }
            let wait = (at - now).min(u32::MAX as Tick) as u32;
            let _ = self.wake_sem.take(Timeout::Ticks(wait));
        }
    }

    /// One scheduler pass: call `execute` on every running task that has
    /// no pending delay. Returns how many handlers ran.
    pub fn tick(&self) -> usize {
        let order = self.tasks.lock().run_order();

        let mut ran = 0;
        for id in order {
            let ops = {
                let mut tasks = self.tasks.lock();
                let Ok(task) = tasks.get(id) else {
                    continue;
                };
                if task.state != LwTaskState::Running {
                    continue;
                }
                if task.delay > 0 {
                    task.delay -= 1;
                    task.stats.count_skip();
                    continue;
                }
                task.stats.count_run();
                task.ops
            };

            let result = ops.execute();
            ran += 1;

            if let Ok(task) = self.tasks.lock().get(id) {
                task.stats.last_result = result;
            }
        }

        crate::trace!("lwsched tick ran {=usize}", ran);
        ran
    }

    /// Register a task in the stopped state
    ///
    /// `priority_hint` orders tasks within a pass, lower first.
    pub fn task_init(&self, ops: &'a dyn LwTaskOps, priority_hint: u8) -> KResult<LwTaskId> {
        self.tasks.lock().insert(ops, priority_hint)
    }

    /// Stopped or paused task starts running from the next pass
    pub fn task_start(&self, id: LwTaskId) -> KResult<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get(id)?;
        match task.state {
            LwTaskState::Stopped | LwTaskState::Paused => {
                task.state = LwTaskState::Running;
                Ok(())
            }
            LwTaskState::Running => Err(KError::Already),
            LwTaskState::Aborted => Err(KError::Inval),
        }
    }

    /// Skip the next `ticks` passes of a running task, keeping it running
    pub fn task_delay(&self, id: LwTaskId, ticks: u32) -> KResult<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get(id)?;
        if task.state != LwTaskState::Running {
            return Err(KError::Inval);
        }
        task.delay = ticks;
        Ok(())
    }

    /// Running task stops being called until started again
    pub fn task_pause(&self, id: LwTaskId) -> KResult<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get(id)?;
        match task.state {
            LwTaskState::Running => {
                task.state = LwTaskState::Paused;
                Ok(())
            }
            LwTaskState::Paused => Err(KError::Already),
            LwTaskState::Stopped | LwTaskState::Aborted => Err(KError::Inval),
        }
    }

    /// Abort a task from any state, running its abort handler right here
    pub fn task_abort(&self, id: LwTaskId) -> KResult<()> {
        let ops = {
            let mut tasks = self.tasks.lock();
            let task = tasks.get(id)?;
            if task.state == LwTaskState::Aborted {
                return Err(KError::Already);
            }
            task.state = LwTaskState::Aborted;
            task.ops
        };

        crate::debug!("lwsched task {=?} aborted", id);
        ops.abort();
        Ok(())
    }

    pub fn task_state(&self, id: LwTaskId) -> KResult<LwTaskState> {
        Ok(self.tasks.lock().get(id)?.state)
    }

    pub fn task_stats(&self, id: LwTaskId) -> KResult<LwTaskStats> {
        Ok(self.tasks.lock().get(id)?.stats)
    }
}
