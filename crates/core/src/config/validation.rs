//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `request_budget_ms` is shorter than `timeout_ms`
    /// - a quality threshold is negative or the link density is not in `0..=1`
    /// - the settle debounce is longer than its ceiling
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.request_budget_ms < self.timeout_ms {
            return Err(invalid("request_budget_ms", "must not be shorter than timeout_ms"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.quality.min_readability_score < 0.0 {
            return Err(invalid("quality.min_readability_score", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.quality.max_link_density) {
            return Err(invalid("quality.max_link_density", "must be between 0 and 1"));
        }

        if self.browser.settle_debounce_ms > self.browser.settle_ceiling_ms {
            return Err(invalid("browser.settle_debounce_ms", "must not exceed browser.settle_ceiling_ms"));
        }
        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            return Err(invalid("browser.viewport", "dimensions must be non-zero"));
        }

        if !self.render_enabled {
            tracing::warn!("render_enabled is false; low-quality pages will not be escalated to the browser");
        }

        Ok(())
    }
}
