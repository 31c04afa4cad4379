//! Secondary-core start-up handshake
//!
//! Runs before the scheduler and the allocator exist, so everything here is
//! plain atomics and bounded spin loops. The wake flag is a single-consumer
//! token: the primary writes the target core's ID, only that core may take
//! the published stack and clear the flag back to 0.

use portable_atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};

use super::{ConnectCaps, InterCoreUnit};
use crate::config::CFG_MP_MAX_NUM_CPUS;
use crate::error::{KError, KResult};
use crate::port;
use crate::types::{CpuId, CpuMask};

/// Entry point of a secondary core
pub type CpuEntryFn = fn(*mut ()) -> !;

/// Boot progress of a core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CpuState {
    NotStarted = 0,
    /// Wake flag raised, core not yet in its entry function
    Waking = 1,
    Running = 2,
}

impl CpuState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CpuState::Waking,
            2 => CpuState::Running,
            _ => CpuState::NotStarted,
        }
    }
}

/// Per-core boot record
pub struct CpuRecord {
    state: AtomicU8,
    entry: AtomicPtr<()>,
    arg: AtomicPtr<()>,
    stack_top: AtomicUsize,
}

impl CpuRecord {
    const INIT: CpuRecord = CpuRecord {
        state: AtomicU8::new(CpuState::NotStarted as u8),
        entry: AtomicPtr::new(core::ptr::null_mut()),
        arg: AtomicPtr::new(core::ptr::null_mut()),
        stack_top: AtomicUsize::new(0),
    };

    #[inline]
    pub fn state(&self) -> CpuState {
        CpuState::from_raw(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn started(&self) -> bool {
        self.state() == CpuState::Running
    }

    /// Initial stack pointer the core picked up from the handshake
    pub fn stack_top(&self) -> usize {
        self.stack_top.load(Ordering::Relaxed)
    }
}

/// Owner of the per-core state of a multi-core system
pub struct BootCoordinator<'hw, const N: usize = CFG_MP_MAX_NUM_CPUS> {
    pub(super) hw: &'hw dyn InterCoreUnit,
    pub(super) num_cpus: usize,
    pub(super) initialized: AtomicBool,
    /// 0 when idle, otherwise the ID of the core being woken
    wake_flag: AtomicUsize,
    /// Stack handed to the core named by `wake_flag`
    wake_stack: AtomicUsize,
    cpus: [CpuRecord; N],
}

impl<'hw, const N: usize> BootCoordinator<'hw, N> {
    /// Coordinator for `num_cpus` cores (at most `N`) driven through `hw`
    pub const fn new(hw: &'hw dyn InterCoreUnit, num_cpus: usize) -> Self {
        assert!(N <= 32, "core bitmap holds 32 cores");
        assert!(num_cpus >= 1 && num_cpus <= N, "core count out of range");

        BootCoordinator {
            hw,
            num_cpus,
            initialized: AtomicBool::new(false),
            wake_flag: AtomicUsize::new(0),
            wake_stack: AtomicUsize::new(0),
            cpus: [CpuRecord::INIT; N],
        }
    }

    /// Number of cores in this system
    #[inline]
    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    /// Global initialization, on the primary core before any `cpu_start`.
    ///
    /// Fails with `NoDevice` when the part lacks inter-core interrupts or
    /// the global free-running counter: the system must not come up
    /// claiming several cores without a working wake path.
    pub fn smp_init(&self) -> KResult<()> {
        assert!(port::cpu_id() == 0, "smp_init off the primary core");

        if self.initialized.load(Ordering::Acquire) {
            return Err(KError::Already);
        }

        let caps = self.hw.caps();
        if !caps.contains(ConnectCaps::IPI) {
            crate::error!("inter-core unit has no inter-core interrupt");
            return Err(KError::NoDevice);
        }
        if !caps.contains(ConnectCaps::GFRC) {
            crate::error!("inter-core unit has no global free running counter");
            return Err(KError::NoDevice);
        }

        let cores = CpuMask::first(self.num_cpus);

        if caps.contains(ConnectCaps::DEBUG) {
            self.hw.debug_halt_group(cores);
        }

        self.hw.clear_ipi(0);
        self.hw.enable_ipi(0);

        self.hw.counter_enable(cores);
        self.hw.counter_clear();

        self.cpus[0]
            .state
            .store(CpuState::Running as u8, Ordering::Release);
        self.initialized.store(true, Ordering::Release);

        crate::info!("smp up, {=usize} cores, caps {=u32:b}", self.num_cpus, caps.bits());
        Ok(())
    }

    /// Wake secondary core `cpu` into `entry(arg)` on the stack whose top is
    /// `stack_top`, returning once the core has taken the stack.
    pub fn cpu_start(
        &self,
        cpu: CpuId,
        entry: CpuEntryFn,
        arg: *mut (),
        stack_top: usize,
    ) -> KResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(KError::NotReady);
        }
        if cpu == 0 || cpu >= self.num_cpus {
            return Err(KError::Inval);
        }

        let record = &self.cpus[cpu];
        record
            .state
            .compare_exchange(
                CpuState::NotStarted as u8,
                CpuState::Waking as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| KError::Already)?;

        record.entry.store(entry as *mut (), Ordering::Relaxed);
        record.arg.store(arg, Ordering::Relaxed);
        self.wake_stack.store(stack_top, Ordering::Relaxed);

        // Publishes entry, arg and stack together with the token
        self.wake_flag.store(cpu, Ordering::Release);
        port::send_event();

        while self.wake_flag.load(Ordering::Acquire) != 0 {
            port::wait_for_event();
        }

        crate::info!("cpu {=usize} started", cpu);
        Ok(())
    }

    /// Start every secondary core in order, core `n` on `stacks[n - 1]`
    pub fn start_secondaries(
        &self,
        stacks: &[usize],
        entry: CpuEntryFn,
        arg: *mut (),
    ) -> KResult<()> {
        if stacks.len() + 1 < self.num_cpus {
            return Err(KError::Inval);
        }

        for (cpu, &stack_top) in (1..self.num_cpus).zip(stacks) {
            self.cpu_start(cpu, entry, arg, stack_top)?;
        }
        Ok(())
    }

    /// Early boot of a secondary core: spin until the primary names `cpu`,
    /// then return the stack published for it.
    ///
    /// The port switches to that stack and continues with
    /// [`BootCoordinator::secondary_start`].
    pub fn wait_for_wake(&self, cpu: CpuId) -> usize {
        assert!(cpu != 0 && cpu < self.num_cpus, "bad secondary core id");

        while self.wake_flag.load(Ordering::Acquire) != cpu {
            port::wait_for_event();
        }

        let stack_top = self.wake_stack.load(Ordering::Relaxed);
        self.cpus[cpu].stack_top.store(stack_top, Ordering::Relaxed);
        stack_top
    }

    /// Second half of secondary boot, on the new stack: set up this core's
    /// wake interrupt, release the primary and enter the function given to
    /// `cpu_start`.
    pub fn secondary_start(&self, cpu: CpuId) -> ! {
        let record = &self.cpus[cpu];
        let entry = record.entry.load(Ordering::Relaxed);
        let arg = record.arg.load(Ordering::Relaxed);
        assert!(!entry.is_null(), "secondary core woken without an entry");

        self.hw.clear_ipi(cpu);
        self.hw.enable_ipi(cpu);

        record
            .state
            .store(CpuState::Running as u8, Ordering::Release);

        // The primary returns from cpu_start once it sees this
        self.wake_flag.store(0, Ordering::Release);
        port::send_event();

        // Stored from a CpuEntryFn in cpu_start
        let entry = unsafe { core::mem::transmute::<*mut (), CpuEntryFn>(entry) };
        entry(arg)
    }

    /// Whole secondary boot for ports that keep running on the boot stack
    pub fn secondary_entry(&self, cpu: CpuId) -> ! {
        self.wait_for_wake(cpu);
        self.secondary_start(cpu)
    }

    /// Boot record of `cpu`
    pub fn cpu(&self, cpu: CpuId) -> Option<&CpuRecord> {
        self.cpus[..self.num_cpus].get(cpu)
    }

    pub fn cpu_state(&self, cpu: CpuId) -> Option<CpuState> {
        self.cpu(cpu).map(CpuRecord::state)
    }

    /// Cores that reached their entry function
    pub fn online_mask(&self) -> CpuMask {
        self.cpus[..self.num_cpus]
            .iter()
            .enumerate()
            .filter(|(_, record)| record.started())
            .fold(CpuMask::EMPTY, |mask, (cpu, _)| mask.with(cpu))
    }

    /// Global free-running counter
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.hw.counter_read()
    }
}
