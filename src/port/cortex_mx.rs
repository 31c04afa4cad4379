//! Cortex-M port implementation
//!
//! Single-core parts always run on core 0. Multi-core builds read the
//! per-core CPUID register and park spinning cores with WFE/SEV.

use crate::config::{CFG_CPUID_REG_ADDR, CFG_SMP};
use crate::types::CpuId;

/// ID of the core executing this code
#[inline]
pub fn cpu_id() -> CpuId {
    if CFG_SMP {
        let id = unsafe { core::ptr::read_volatile(CFG_CPUID_REG_ADDR as *const u32) };
        id as CpuId
    } else {
        0
    }
}

/// Hint issued once per iteration of a bounded spin loop
#[inline(always)]
pub fn cpu_relax() {
    cortex_m::asm::nop();
}

/// Sleep until another core signals an event
#[inline(always)]
pub fn wait_for_event() {
    if CFG_SMP {
        cortex_m::asm::wfe();
    } else {
        cortex_m::asm::nop();
    }
}

/// Wake every core sleeping in [`wait_for_event`]
#[inline(always)]
pub fn send_event() {
    if CFG_SMP {
        cortex_m::asm::dsb();
        cortex_m::asm::sev();
    }
}
