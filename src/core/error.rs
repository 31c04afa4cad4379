//! Error types for the kernel primitives
//!
//! Recoverable conditions (timeouts, exhaustion, missing hardware) come back
//! as `Err(KError)`. Contract violations panic instead.

/// Kernel error type
///
/// Discriminants are the classic negative errno values so that the codes can
/// cross into C callers unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum KError {
    /// Resource unavailable and the caller asked not to wait
    Busy = -16,
    /// Waiting period elapsed
    Timeout = -11,
    /// Object was reset while waiting
    Reset = -1011,
    /// Invalid argument or state transition
    Inval = -22,
    /// Operation already performed
    Already = -120,
    /// No free slot left in a fixed-size table
    NoSpace = -28,
    /// Required hardware capability is missing
    NoDevice = -19,
    /// Subsystem not initialized yet
    NotReady = -134,
}

/// Result type alias for kernel operations
pub type KResult<T> = Result<T, KError>;

const EAGAIN: i32 = 11;

impl KError {
    /// Negative errno code for this error
    ///
    /// A reset waiter reports `-EAGAIN` just like a timed out one.
    #[inline]
    pub fn as_errno(self) -> i32 {
        match self {
            KError::Reset => -EAGAIN,
            other => other as i32,
        }
    }

    /// Did the operation fail because a wait ended without the resource
    #[inline]
    pub fn is_wait_failure(self) -> bool {
        matches!(self, KError::Busy | KError::Timeout | KError::Reset)
    }
}

impl core::fmt::Display for KError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            KError::Busy => "resource busy",
            KError::Timeout => "waiting period timed out",
            KError::Reset => "object reset while waiting",
            KError::Inval => "invalid argument",
            KError::Already => "operation already done",
            KError::NoSpace => "no free slot",
            KError::NoDevice => "required hardware capability missing",
            KError::NotReady => "not initialized",
        };
        f.write_str(msg)
    }
}
