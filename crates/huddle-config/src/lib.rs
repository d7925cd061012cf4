// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Huddle dispatch scheduler.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, and environment
//! variable overrides.
//!
//! # Usage
//!
//! ```no_run
//! use huddle_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("debounce window: {}s", config.scheduler.debounce_window_secs);
//! ```

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::HuddleConfig;
pub use validation::{ConfigError, validate_config};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Returns either a valid [`HuddleConfig`] or the list of everything
/// wrong with the configuration.
pub fn load_and_validate() -> Result<HuddleConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Extraction(Box::new(err))]),
    }
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<HuddleConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Extraction(Box::new(err))]),
    }
}

/// Render config errors to stderr, one line each.
pub fn render_errors(errors: &[ConfigError]) {
    for err in errors {
        eprintln!("huddle: config error: {err}");
    }
}
