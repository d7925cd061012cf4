// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects all errors rather than failing fast.

use thiserror::Error;

use crate::model::HuddleConfig;

/// A single configuration error, either from extraction or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML extraction failed (parse error, type mismatch, unknown key).
    #[error("{0}")]
    Extraction(#[from] Box<figment::Error>),

    /// A semantic constraint was violated.
    #[error("{message}")]
    Validation { message: String },
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors.
pub fn validate_config(config: &HuddleConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.scheduler.debounce_window_secs <= 0 {
        errors.push(validation(format!(
            "scheduler.debounce_window_secs must be positive, got {}",
            config.scheduler.debounce_window_secs
        )));
    }

    if config.scheduler.sweep_limit <= 0 {
        errors.push(validation(format!(
            "scheduler.sweep_limit must be positive, got {}",
            config.scheduler.sweep_limit
        )));
    }

    if config.scheduler.cron_scan_limit <= 0 {
        errors.push(validation(format!(
            "scheduler.cron_scan_limit must be positive, got {}",
            config.scheduler.cron_scan_limit
        )));
    }

    if config.scheduler.poll_interval_ms == 0 {
        errors.push(validation(
            "scheduler.poll_interval_ms must be positive".to_string(),
        ));
    }

    if config.scheduler.retry_delay_secs <= 0 {
        errors.push(validation(format!(
            "scheduler.retry_delay_secs must be positive, got {}",
            config.scheduler.retry_delay_secs
        )));
    }

    if config.scheduler.max_dispatch_attempts < 1 {
        errors.push(validation(format!(
            "scheduler.max_dispatch_attempts must be at least 1, got {}",
            config.scheduler.max_dispatch_attempts
        )));
    }

    if config.recovery.orphan_age_secs <= 0 {
        errors.push(validation(format!(
            "recovery.orphan_age_secs must be positive, got {}",
            config.recovery.orphan_age_secs
        )));
    }

    if config.recovery.force_processed_horizon_secs <= config.recovery.orphan_age_secs {
        errors.push(validation(format!(
            "recovery.force_processed_horizon_secs ({}) must exceed recovery.orphan_age_secs ({})",
            config.recovery.force_processed_horizon_secs, config.recovery.orphan_age_secs
        )));
    }

    if config.watchdog.enabled && config.watchdog.interval_secs == 0 {
        errors.push(validation(
            "watchdog.interval_secs must be positive when the watchdog is enabled".to_string(),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(validation(
            "storage.database_path must not be empty".to_string(),
        ));
    }

    if let Some(url) = &config.dispatcher.endpoint_url
        && !url.starts_with("http://")
        && !url.starts_with("https://")
    {
        errors.push(validation(format!(
            "dispatcher.endpoint_url must be an http(s) URL, got `{url}`"
        )));
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(validation("gateway.host must not be empty".to_string()));
    }

    match config.log.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => errors.push(validation(format!(
            "log.level must be one of trace/debug/info/warn/error, got `{other}`"
        ))),
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validation(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
