#![deny(missing_docs)]
//! Shared logging utilities for the sitewatch workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! the scan-cycle tag they prefix onto messages, and a minimal test
//! initializer for the global logger.

use std::cell::Cell;

#[doc(hidden)]
pub use log as __log;

thread_local! {
    /// Scan cycle currently running on this thread, 0 when idle.
    static SCAN_CYCLE: Cell<u64> = const { Cell::new(0) };
}

/// Marks the current thread as running the given scan cycle.
/// Messages logged through the `engine_*` macros are tagged with it until
/// [`clear_scan_cycle`] is called.
pub fn set_scan_cycle(cycle: u64) {
    SCAN_CYCLE.with(|v| v.set(cycle));
}

/// Clears the scan-cycle tag for the current thread.
pub fn clear_scan_cycle() {
    SCAN_CYCLE.with(|v| v.set(0));
}

/// Returns the scan cycle running on the current thread, or 0 when idle.
pub fn current_scan_cycle() -> u64 {
    SCAN_CYCLE.with(|v| v.get())
}

#[doc(hidden)]
#[macro_export]
macro_rules! __engine_log {
    ($level:expr, $($arg:tt)*) => {{
        match $crate::current_scan_cycle() {
            0 => $crate::__log::log!($level, $($arg)*),
            cycle => $crate::__log::log!(
                $level,
                "[cycle {}] {}",
                cycle,
                format_args!($($arg)*)
            ),
        }
    }};
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        $crate::__engine_log!($crate::__log::Level::Trace, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        $crate::__engine_log!($crate::__log::Level::Info, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        $crate::__engine_log!($crate::__log::Level::Debug, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        $crate::__engine_log!($crate::__log::Level::Warn, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        $crate::__engine_log!($crate::__log::Level::Error, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
