//! Core type definitions
//!
//! These types provide strong typing for the kernel primitives.

use core::cmp::Ordering;
use core::fmt;

use crate::config::CFG_MP_MAX_NUM_CPUS;

/// Core identifier, 0 is the primary core
pub type CpuId = usize;

/// Kernel tick counter
pub type Tick = u64;

/// Semaphore counter type
pub type SemCount = u32;

/// Handle to a thread owned by the general scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(pub u32);

/// Relative waiting period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Do not wait
    NoWait,
    /// Wait at most this many ticks
    Ticks(u32),
    /// Wait until woken
    Forever,
}

impl Timeout {
    /// Absolute deadline for a wait starting at `now`
    pub fn deadline(self, now: Tick) -> Deadline {
        match self {
            Timeout::NoWait => Deadline::At(now),
            Timeout::Ticks(n) => Deadline::At(now.saturating_add(n as Tick)),
            Timeout::Forever => Deadline::Forever,
        }
    }

    /// Convert milliseconds to a tick timeout, rounding up
    pub const fn from_millis(ms: u32) -> Self {
        let ticks = (ms as u64 * crate::config::CFG_TICK_RATE_HZ as u64).div_ceil(1000);
        if ticks > u32::MAX as u64 {
            Timeout::Forever
        } else {
            Timeout::Ticks(ticks as u32)
        }
    }
}

/// Absolute point in time at which a wait expires
///
/// Ordered so that `Forever` comes after every finite deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Deadline {
    At(Tick),
    Forever,
}

impl Deadline {
    /// Has the deadline been reached at tick `now`
    #[inline]
    pub fn expired(self, now: Tick) -> bool {
        match self {
            Deadline::At(t) => now >= t,
            Deadline::Forever => false,
        }
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Deadline::At(a), Deadline::At(b)) => a.cmp(b),
            (Deadline::At(_), Deadline::Forever) => Ordering::Less,
            (Deadline::Forever, Deadline::At(_)) => Ordering::Greater,
            (Deadline::Forever, Deadline::Forever) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bitmap of core IDs, bit `n` selects core `n`
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CpuMask(pub u32);

impl CpuMask {
    pub const EMPTY: CpuMask = CpuMask(0);

    /// Mask with only `cpu` set
    #[inline]
    pub const fn single(cpu: CpuId) -> Self {
        CpuMask(1 << cpu)
    }

    /// Mask with cores `0..n` set
    #[inline]
    pub const fn first(n: usize) -> Self {
        if n >= 32 {
            CpuMask(u32::MAX)
        } else {
            CpuMask((1u32 << n) - 1)
        }
    }

    /// Every core the kernel is built for
    #[inline]
    pub const fn all() -> Self {
        Self::first(CFG_MP_MAX_NUM_CPUS)
    }

    #[inline]
    pub const fn contains(self, cpu: CpuId) -> bool {
        cpu < 32 && self.0 & (1 << cpu) != 0
    }

    #[inline]
    pub const fn with(self, cpu: CpuId) -> Self {
        CpuMask(self.0 | (1 << cpu))
    }

    #[inline]
    pub const fn without(self, cpu: CpuId) -> Self {
        CpuMask(self.0 & !(1 << cpu))
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate over the set core IDs in ascending order
    pub fn iter(self) -> impl Iterator<Item = CpuId> {
        let mut bits = self.0;
        core::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let cpu = bits.trailing_zeros() as CpuId;
            bits &= bits - 1;
            Some(cpu)
        })
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuMask({:#b})", self.0)
    }
}

impl core::ops::BitOr for CpuMask {
    type Output = CpuMask;

    fn bitor(self, rhs: CpuMask) -> CpuMask {
        CpuMask(self.0 | rhs.0)
    }
}
