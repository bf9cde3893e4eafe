//! Logging utilities
//!
//! Usage errors are logged at `warn`, consistency-check failures at `error`.
//! Debug builds attach a captured backtrace to consistency failures.

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// Log a consistency-check failure (duplicate registration, missing removal target)
///
/// Execution continues afterwards; the caller treats the case as already handled.
pub fn consistency_failure(message: &str) {
    #[cfg(debug_assertions)]
    {
        let backtrace = std::backtrace::Backtrace::capture();
        log::error!("{message}\n{backtrace}");
    }
    #[cfg(not(debug_assertions))]
    {
        log::error!("{message}");
    }
}
