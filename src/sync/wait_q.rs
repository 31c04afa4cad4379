//! Wait queue for threads blocked on a kernel object
//!
//! A fixed-capacity slot arena. A blocked thread owns its slot from
//! [`WaitQueue::enqueue`] until it collects the outcome, so the waker can
//! leave the reason behind without the two racing. The owning object's
//! spinlock must be held for every call.

use crate::types::{CpuId, Deadline, ThreadId, Tick};

/// Why a waiter was woken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeReason {
    /// Handed the resource directly
    Given,
    /// Object was reset
    Reset,
}

/// A thread parked in a wait queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub thread: ThreadId,
    /// Core the thread was running on when it blocked
    pub cpu: CpuId,
    pub deadline: Deadline,
    seq: u64,
}

/// Index of an occupied slot, held by the blocked thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSlot(usize);

#[derive(Clone, Copy)]
enum SlotState {
    Waiting,
    Woken(WakeReason),
}

#[derive(Clone, Copy)]
struct Slot {
    waiter: Waiter,
    state: SlotState,
}

pub struct WaitQueue<const N: usize> {
    slots: [Option<Slot>; N],
    next_seq: u64,
    waiting: usize,
}

impl<const N: usize> WaitQueue<N> {
    pub const fn new() -> Self {
        WaitQueue {
            slots: [None; N],
            next_seq: 0,
            waiting: 0,
        }
    }

    /// Number of threads still waiting
    #[inline]
    pub fn len(&self) -> usize {
        self.waiting
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waiting == 0
    }

    /// Park a thread. `None` when every slot is taken.
    pub fn enqueue(&mut self, thread: ThreadId, cpu: CpuId, deadline: Deadline) -> Option<WaitSlot> {
        let index = self.slots.iter().position(Option::is_none)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[index] = Some(Slot {
            waiter: Waiter {
                thread,
                cpu,
                deadline,
                seq,
            },
            state: SlotState::Waiting,
        });
        self.waiting += 1;
        Some(WaitSlot(index))
    }

    /// Wake the waiter with the earliest deadline, first come first served
    /// among equal deadlines.
    ///
    /// Waiters whose deadline has passed at `now` are skipped: they are
    /// timing out and will withdraw themselves.
    pub fn wake_first(&mut self, now: Tick, reason: WakeReason) -> Option<Waiter> {
        let index = self.first_waiting(|w| !w.deadline.expired(now))?;
        self.mark_woken(index, reason)
    }

    /// Wake every waiter, expired or not, calling `on_wake` for each in
    /// queue order
    pub fn wake_all(&mut self, reason: WakeReason, mut on_wake: impl FnMut(&Waiter)) {
        while let Some(index) = self.first_waiting(|_| true) {
            if let Some(waiter) = self.mark_woken(index, reason) {
                on_wake(&waiter);
            }
        }
    }

    /// Outcome for the thread owning `slot`.
    ///
    /// Frees the slot and returns the reason once the thread was woken;
    /// `None` while it is still waiting.
    pub fn collect(&mut self, slot: WaitSlot) -> Option<WakeReason> {
        match self.slots[slot.0] {
            Some(Slot {
                state: SlotState::Woken(reason),
                ..
            }) => {
                self.slots[slot.0] = None;
                Some(reason)
            }
            Some(Slot {
                state: SlotState::Waiting,
                ..
            }) => None,
            None => panic!("wait slot {} collected twice", slot.0),
        }
    }

    /// Withdraw a still-waiting thread, e.g. on timeout.
    ///
    /// Returns the wake reason instead if a waker got there first.
    pub fn cancel(&mut self, slot: WaitSlot) -> Option<WakeReason> {
        if let Some(reason) = self.collect(slot) {
            return Some(reason);
        }
        self.slots[slot.0] = None;
        self.waiting -= 1;
        None
    }

    /// The waiter parked in `slot`
    pub fn waiter(&self, slot: WaitSlot) -> Option<&Waiter> {
        self.slots[slot.0].as_ref().map(|s| &s.waiter)
    }

    fn first_waiting(&self, eligible: impl Fn(&Waiter) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(Slot {
                    waiter,
                    state: SlotState::Waiting,
                }) if eligible(waiter) => Some((i, waiter)),
                _ => None,
            })
            .min_by_key(|(_, w)| (w.deadline, w.seq))
            .map(|(i, _)| i)
    }

    fn mark_woken(&mut self, index: usize, reason: WakeReason) -> Option<Waiter> {
        let slot = self.slots[index].as_mut()?;
        slot.state = SlotState::Woken(reason);
        self.waiting -= 1;
        Some(slot.waiter)
    }
}

impl<const N: usize> Default for WaitQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
