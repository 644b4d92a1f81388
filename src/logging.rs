//! Logging macros - forward to the `log` crate when the `logging` feature is
//! enabled, and compile to nothing otherwise.
//!
//! The disabled forms still type-check their arguments inside a dead branch
//! so values used only for logging do not trigger unused warnings.

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!(target: "parsanol_variants", $($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{ if false { let _ = format!($($arg)*); } }};
}

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => { log::info!(target: "parsanol_variants", $($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {{ if false { let _ = format!($($arg)*); } }};
}

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!(target: "parsanol_variants", $($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{ if false { let _ = format!($($arg)*); } }};
}
