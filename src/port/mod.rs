//! Port layer - CPU-specific implementations
//!
//! Provides the current core ID and the event primitives used by the boot
//! handshake spin loops.

#[cfg(target_arch = "arm")]
pub mod cortex_mx;

#[cfg(target_arch = "arm")]
pub use cortex_mx::*;

// Host implementation used by the test harness
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use portable_atomic::{AtomicPtr, Ordering};

    use crate::types::CpuId;

    static CPU_ID_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

    /// Install the function that reports which simulated core the calling
    /// host thread stands for. Without a hook every thread is core 0.
    pub fn set_cpu_id_hook(hook: fn() -> CpuId) {
        CPU_ID_HOOK.store(hook as *mut (), Ordering::Release);
    }

    #[inline]
    pub fn cpu_id() -> CpuId {
        let hook = CPU_ID_HOOK.load(Ordering::Acquire);
        if hook.is_null() {
            return 0;
        }
        // Only ever stored from a `fn() -> CpuId` in set_cpu_id_hook.
        let hook: fn() -> CpuId = unsafe { core::mem::transmute::<*mut (), fn() -> CpuId>(hook) };
        hook()
    }

    #[inline(always)]
    pub fn cpu_relax() {
        core::hint::spin_loop();
    }

    #[inline(always)]
    pub fn wait_for_event() {
        core::hint::spin_loop();
    }

    #[inline(always)]
    pub fn send_event() {}
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
