//! Synchronization primitives
//!
//! Contains the spinlock, the wait queue and counting semaphores.

pub mod spinlock;
pub mod wait_q;

#[cfg(feature = "sem")]
pub mod sem;
