//! # Structured Logging
//!
//! Environment-aware tracing setup. Production emits JSON lines for log
//! shipping; everything else gets the human-readable console format.
//! Initialization is idempotent so embedders that already installed a
//! global subscriber keep theirs.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let result = if environment == "production" {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_filter(filter),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_filter(filter),
                )
                .try_init()
        };

        if result.is_err() {
            // A global subscriber is already set; continue with it.
            tracing::debug!("Global tracing subscriber already initialized");
        } else {
            tracing::info!(environment = %environment, "Structured logging initialized");
        }
    });
}

fn get_environment() -> String {
    std::env::var("TASKFORGE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("TASKFORGE_ENV", "test_override");
        assert_eq!(get_environment(), "test_override");
        std::env::remove_var("TASKFORGE_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("unknown"), "debug");
    }
}
