//! Tracing setup for processes embedding the engine.
//!
//! [`init_tracing`] installs a `fmt` subscriber whose filter sits behind a
//! reload layer. The engine's `log_level` setting is applied through
//! [`set_log_level`] when it is built from configuration, so a level change
//! takes effect without reinstalling the subscriber.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use crate::error::ConfigError;

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Parses a filter directive such as `info` or `urlgate_resolver=debug,warn`.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the directive does not parse.
pub fn parse_filter(directive: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directive)
        .map_err(|e| ConfigError::validation(format!("log_level '{directive}' is invalid: {e}")))
}

/// Installs the global subscriber with `default_level` as its filter.
///
/// `RUST_LOG` takes precedence when set and valid. Returns true if this call
/// installed the subscriber; later calls and calls made after another
/// subscriber was installed return false.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| parse_filter(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (reload_layer, handle) = reload::Layer::new(filter);
    if FILTER_HANDLE.set(handle).is_err() {
        return false;
    }

    tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init()
        .is_ok()
}

/// Whether [`init_tracing`] has installed the reloadable filter.
#[must_use]
pub fn is_initialized() -> bool {
    FILTER_HANDLE.get().is_some()
}

/// Replaces the active filter with `directive`.
///
/// Returns false without error when [`init_tracing`] was never called, e.g.
/// when the host process manages its own subscriber.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the directive does not parse.
pub fn set_log_level(directive: &str) -> Result<bool, ConfigError> {
    let filter = parse_filter(directive)?;
    let Some(handle) = FILTER_HANDLE.get() else {
        return Ok(false);
    };
    handle
        .reload(filter)
        .map_err(|e| ConfigError::validation(format!("log filter reload failed: {e}")))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("debug").is_ok());
        assert!(parse_filter("urlgate_resolver=trace,warn").is_ok());
        assert!(matches!(
            parse_filter("urlgate_resolver=loud"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_level_changes_after_init() {
        init_tracing("debug");
        assert!(is_initialized());
        assert!(!init_tracing("warn"));

        assert!(set_log_level("error").unwrap());
        tracing::info!("not emitted at error level");
        assert!(set_log_level("urlgate_resolver=loud").is_err());
        assert!(set_log_level("debug").unwrap());
    }
}
