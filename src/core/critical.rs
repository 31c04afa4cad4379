//! Local interrupt masking
//!
//! The interrupt lock is the uniprocessor half of every spinlock. It goes
//! through the `critical-section` crate so the same code runs on Cortex-M
//! (PRIMASK, registered in the crate root) and on the host test harness.

use critical_section::RestoreState;

/// Interrupt state captured by [`irq_lock`]
///
/// Consumed by [`irq_unlock`], which puts interrupts back exactly as they
/// were, so nested lock/unlock pairs never re-enable interrupts early.
#[must_use = "dropping an IrqKey leaves interrupts masked"]
pub struct IrqKey(RestoreState);

/// Mask interrupts on the calling core
#[inline(always)]
pub fn irq_lock() -> IrqKey {
    // Released by irq_unlock in LIFO order; keys are not Copy so each
    // acquisition is released at most once.
    IrqKey(unsafe { critical_section::acquire() })
}

/// Restore the interrupt state captured in `key`
#[inline(always)]
pub fn irq_unlock(key: IrqKey) {
    unsafe { critical_section::release(key.0) }
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
