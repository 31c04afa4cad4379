//! Secondary-core boot and inter-processor interrupts
//!
//! [`BootCoordinator`] owns the per-core records and the wake-flag handshake
//! (`boot`), and fans scheduler IPIs out to other cores (`ipi`). The
//! interrupt controller and global counter it drives sit behind
//! [`InterCoreUnit`].

mod boot;
mod ipi;

pub use boot::{BootCoordinator, CpuEntryFn, CpuRecord, CpuState};

use bitflags::bitflags;

use crate::types::{CpuId, CpuMask};

bitflags! {
    /// Capabilities reported by the inter-core unit
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnectCaps: u32 {
        /// Inter-core interrupt lines
        const IPI = 1 << 0;
        /// Global free-running counter shared by all cores
        const GFRC = 1 << 1;
        /// Inter-core debug unit
        const DEBUG = 1 << 2;
    }
}

/// Inter-core interrupt controller, global counter and debug unit of a
/// multi-core part.
pub trait InterCoreUnit: Sync {
    /// Capabilities present on this part
    fn caps(&self) -> ConnectCaps;

    /// Raise the inter-core interrupt of `cpu`
    fn raise_ipi(&self, cpu: CpuId);

    /// Acknowledge the inter-core interrupt pending on `cpu`
    fn clear_ipi(&self, cpu: CpuId);

    /// Unmask the inter-core interrupt line of `cpu`
    fn enable_ipi(&self, cpu: CpuId);

    /// Start the global counter and keep it running while any of `cores`
    /// runs
    fn counter_enable(&self, cores: CpuMask);

    /// Zero the global counter
    fn counter_clear(&self);

    fn counter_read(&self) -> u64;

    /// Halt all of `cores` together when a debugger halts one of them
    fn debug_halt_group(&self, cores: CpuMask) {
        let _ = cores;
    }
}
