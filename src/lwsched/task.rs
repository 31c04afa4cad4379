//! Lightweight task types and the scheduler's task table

use heapless::Vec;

use crate::config::CFG_LWSCHED_TASKS_MAX;
use crate::error::{KError, KResult};

/// Work run by a lightweight scheduler
///
/// Handlers run on the scheduler's host thread with the task table
/// unlocked, so they may pause, delay or abort their own task.
pub trait LwTaskOps: Sync {
    /// One periodic invocation. The value is kept in the task's
    /// statistics; it never changes the period.
    fn execute(&self) -> u32;

    /// Called once, synchronously from `task_abort`
    fn abort(&self) {}
}

/// Lightweight task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LwTaskState {
    Stopped,
    Running,
    Paused,
    Aborted,
}

/// Handle of a task registered with an [`LwScheduler`](super::LwScheduler)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LwTaskId {
    index: u16,
    generation: u16,
}

/// Per-task accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LwTaskStats {
    /// `execute` invocations
    pub runs: u32,
    /// Ticks swallowed by `task_delay`
    pub skipped: u32,
    /// Value returned by the latest `execute`
    pub last_result: u32,
}

impl LwTaskStats {
    /// Count one `execute` invocation, wrapping past `u32::MAX`
    #[inline]
    pub fn count_run(&mut self) {
        self.runs = self.runs.wrapping_add(1);
    }

    /// Count one pass swallowed by a delay, wrapping past `u32::MAX`
    #[inline]
    pub fn count_skip(&mut self) {
        self.skipped = self.skipped.wrapping_add(1);
    }
}

#[derive(Clone, Copy)]
pub(super) struct TaskSlot<'a> {
    pub(super) ops: &'a dyn LwTaskOps,
    pub(super) state: LwTaskState,
    pub(super) delay: u32,
    pub(super) prio: u8,
    pub(super) seq: u32,
    pub(super) stats: LwTaskStats,
}

pub(super) struct TaskTable<'a> {
    slots: [Option<TaskSlot<'a>>; CFG_LWSCHED_TASKS_MAX],
    generations: [u16; CFG_LWSCHED_TASKS_MAX],
    next_seq: u32,
}

impl<'a> TaskTable<'a> {
    pub(super) const fn new() -> Self {
        TaskTable {
            slots: [None; CFG_LWSCHED_TASKS_MAX],
            generations: [0; CFG_LWSCHED_TASKS_MAX],
            next_seq: 0,
        }
    }

    /// Register a stopped task in a free or aborted slot
    pub(super) fn insert(&mut self, ops: &'a dyn LwTaskOps, prio: u8) -> KResult<LwTaskId> {
        let index = self
            .slots
            .iter()
            .position(|slot| match slot {
                None => true,
                Some(task) => task.state == LwTaskState::Aborted,
            })
            .ok_or(KError::NoSpace)?;

        let generation = self.generations[index].wrapping_add(1);
        self.generations[index] = generation;

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        self.slots[index] = Some(TaskSlot {
            ops,
            state: LwTaskState::Stopped,
            delay: 0,
            prio,
            seq,
            stats: LwTaskStats::default(),
        });

        Ok(LwTaskId {
            index: index as u16,
            generation,
        })
    }

    /// Slot behind `id`, `Inval` for ids of recycled or foreign slots
    pub(super) fn get(&mut self, id: LwTaskId) -> KResult<&mut TaskSlot<'a>> {
        let index = id.index as usize;
        if index >= CFG_LWSCHED_TASKS_MAX || self.generations[index] != id.generation {
            return Err(KError::Inval);
        }
        self.slots[index].as_mut().ok_or(KError::Inval)
    }

    /// Running tasks ordered by priority hint, then registration
    pub(super) fn run_order(&self) -> Vec<LwTaskId, CFG_LWSCHED_TASKS_MAX> {
        // One entry per slot at most, so the collect never overflows
        let mut order: Vec<(u8, u32, LwTaskId), CFG_LWSCHED_TASKS_MAX> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Some(task) if task.state == LwTaskState::Running => Some((
                    task.prio,
                    task.seq,
                    LwTaskId {
                        index: index as u16,
                        generation: self.generations[index],
                    },
                )),
                _ => None,
            })
            .collect();

        order.sort_unstable_by_key(|&(prio, seq, _)| (prio, seq));
        order.iter().map(|&(_, _, id)| id).collect()
    }
}
