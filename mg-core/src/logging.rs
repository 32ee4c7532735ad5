//! Logging setup shared by the binaries
//!
//! System binaries (boot controller, helper) log to the systemd journal when
//! it is reachable and to stderr otherwise. The CLI always logs to stderr so
//! stdout stays clean for command output.

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::constants::logging;

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Journald,
    Stderr,
}

/// Filter directive: `MUXGUARD_LOG` if set, else the configured level
pub fn log_filter(configured: &str) -> String {
    std::env::var(logging::LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_new(log_filter(configured)).unwrap_or_else(|e| {
        eprintln!("Invalid log filter ({}), using {}", e, logging::DEFAULT_LEVEL);
        EnvFilter::new(logging::DEFAULT_LEVEL)
    })
}

/// Journald when available, stderr otherwise
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_system_logging(configured: &str) -> LogSink {
    if Path::new(logging::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald) => {
                let _ = tracing_subscriber::registry()
                    .with(journald)
                    .with(env_filter(configured))
                    .try_init();
                return LogSink::Journald;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stderr", e),
        }
    }

    init_stderr(configured);
    LogSink::Stderr
}

/// Plain stderr logging for interactive use
pub fn init_cli_logging(configured: &str) {
    init_stderr(configured);
}

fn init_stderr(configured: &str) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(configured))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_overrides_config() {
        std::env::set_var(logging::LOG_ENV, "mg_core=trace");
        assert_eq!(log_filter("warn"), "mg_core=trace");
        std::env::remove_var(logging::LOG_ENV);
    }

    #[test]
    #[serial]
    fn test_config_used_without_env() {
        std::env::remove_var(logging::LOG_ENV);
        assert_eq!(log_filter("debug"), "debug");

        std::env::set_var(logging::LOG_ENV, "  ");
        assert_eq!(log_filter("debug"), "debug");
        std::env::remove_var(logging::LOG_ENV);
    }
}
