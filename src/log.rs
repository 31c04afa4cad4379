//! Kernel logging macros
//!
//! Forward to `defmt` when the `defmt` feature is enabled and expand to
//! nothing otherwise, so log points cost nothing on lean builds. Arguments
//! follow `defmt` format syntax.

#[cfg(feature = "defmt")]
#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => { defmt::$level!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Trace message, for per-IPI and per-tick chatter
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__klog!(trace, $($arg)*) };
}

/// Debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__klog!(debug, $($arg)*) };
}

/// Info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__klog!(info, $($arg)*) };
}

/// Warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__klog!(warn, $($arg)*) };
}

/// Error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__klog!(error, $($arg)*) };
}
