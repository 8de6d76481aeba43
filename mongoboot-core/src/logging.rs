//! Logging setup for mongoboot binaries.
//!
//! The library itself only emits `tracing` events; binaries call
//! [`init_logging`] once at startup.

use crate::Result;

/// Maps CLI verbosity flags to a log level.
///
/// quiet → ERROR, 0 → INFO, 1 → DEBUG, 2+ → TRACE
pub fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Errors
/// Returns a configuration error if a global subscriber is already installed.
///
/// # Example
/// ```rust,no_run
/// use mongoboot_core::logging::init_logging;
///
/// init_logging(1, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| {
            crate::error::BootstrapError::configuration(format!(
                "Failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let test_cases = [
            ((true, 0), tracing::Level::ERROR),
            ((true, 5), tracing::Level::ERROR),
            ((false, 0), tracing::Level::INFO),
            ((false, 1), tracing::Level::DEBUG),
            ((false, 2), tracing::Level::TRACE),
            ((false, 10), tracing::Level::TRACE),
        ];

        for ((quiet, verbose), expected) in test_cases {
            assert_eq!(
                level_for(verbose, quiet),
                expected,
                "Failed for quiet={}, verbose={}",
                quiet,
                verbose
            );
        }
    }

    #[test]
    fn test_second_init_is_configuration_error() {
        // The global subscriber may already be set by an earlier call
        let _ = init_logging(0, true);

        let err = init_logging(0, false).unwrap_err();
        assert!(matches!(
            err,
            crate::error::BootstrapError::Configuration { .. }
        ));
        assert!(err.to_string().contains("Failed to initialize logging"));
    }
}
