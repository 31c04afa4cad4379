//! SMP-safe concurrency substrate for small RTOS kernels
//!
//! Building blocks a preemptive kernel needs once it runs on more than one
//! core:
//! - Spinlocks combining interrupt masking with a cross-core lock word
//! - Counting semaphores with timeouts and reset
//! - Secondary-core boot handshake and scheduler IPIs
//! - A lightweight periodic scheduler multiplexing small jobs on one thread
//!
//! The thread scheduler itself is not part of this crate. Blocking
//! primitives reach it through the [`Kernel`] trait.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    /// Per-core interrupt masking. Cross-core exclusion is the spinlock's
    /// lock word, not this.
    struct PrimaskCriticalSection;
    set_impl!(PrimaskCriticalSection);

    unsafe impl Impl for PrimaskCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;
pub mod sync;

#[cfg(feature = "smp")]
pub mod smp;

#[cfg(feature = "lwsched")]
pub mod lwsched;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{KError, KResult};
pub use crate::core::kernel;
pub use crate::core::kernel::Kernel;
pub use crate::core::types;
pub use crate::core::types::*;

pub use crate::sync::spinlock::{SpinGuard, SpinKey, SpinLocked, Spinlock};

#[cfg(feature = "sem")]
pub use crate::sync::sem;
#[cfg(feature = "sem")]
pub use crate::sync::sem::Semaphore;

#[cfg(feature = "smp")]
pub use crate::smp::{BootCoordinator, ConnectCaps, InterCoreUnit};

#[cfg(feature = "lwsched")]
pub use crate::lwsched::{LwScheduler, LwTaskId, LwTaskOps};
