//! Compile-time configuration for the concurrency substrate
//!
//! These constants control the behavior and resource limits of the kernel
//! primitives. Core count follows the `smp` cargo feature.

/// Multi-core build
pub const CFG_SMP: bool = cfg!(feature = "smp");

/// Maximum number of cores the kernel is built for
pub const CFG_MP_MAX_NUM_CPUS: usize = if CFG_SMP { 4 } else { 1 };

/// Track spinlock ownership and trap recursion / foreign unlock
pub const CFG_SPIN_VALIDATE: bool = cfg!(debug_assertions);

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Wait-queue slots per semaphore
pub const CFG_SEM_WAITERS_MAX: usize = 16;

/// Task slots per lightweight scheduler instance
pub const CFG_LWSCHED_TASKS_MAX: usize = 32;

/// Default lightweight scheduler interval in ticks
pub const CFG_LWSCHED_TICK_DEFAULT: u32 = 10;

/// Address of the per-core CPUID register on dual-core Cortex-M parts
/// (SIO block). Only read on multi-core ARM builds.
pub const CFG_CPUID_REG_ADDR: usize = 0xD000_0000;

const _: () = assert!(CFG_MP_MAX_NUM_CPUS >= 1 && CFG_MP_MAX_NUM_CPUS <= 32);
const _: () = assert!(CFG_SEM_WAITERS_MAX > 0);
const _: () = assert!(CFG_LWSCHED_TASKS_MAX > 0 && CFG_LWSCHED_TASKS_MAX <= u16::MAX as usize);
