//! Scheduler IPIs
//!
//! An IPI carries no payload. The receiving core only learns that
//! scheduler state may have changed and re-evaluates its runnable threads.

use portable_atomic::Ordering;

use super::BootCoordinator;
use crate::kernel::Kernel;
use crate::port;
use crate::types::CpuMask;

impl<const N: usize> BootCoordinator<'_, N> {
    /// Interrupt every core in `targets` except the caller's own.
    ///
    /// Does nothing until [`BootCoordinator::smp_init`] has succeeded.
    pub fn sched_directed_ipi(&self, targets: CpuMask) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }

        let me = port::cpu_id();
        let targets = CpuMask(targets.0 & CpuMask::first(self.num_cpus).0).without(me);

        crate::trace!("ipi {=usize} -> {=u32:b}", me, targets.0);

        for cpu in targets.iter() {
            self.hw.raise_ipi(cpu);
        }
    }

    /// Interrupt every other core
    #[inline]
    pub fn sched_broadcast_ipi(&self) {
        self.sched_directed_ipi(CpuMask::first(self.num_cpus));
    }

    /// Inter-core interrupt handler of the calling core.
    ///
    /// Acknowledges the interrupt and lets the scheduler look again at
    /// what is runnable here.
    pub fn handle_ipi(&self, kernel: &dyn Kernel) {
        self.hw.clear_ipi(port::cpu_id());
        kernel.sched_ipi();
    }
}
