// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./huddle.toml` > `~/.config/huddle/huddle.toml`
//! > `/etc/huddle/huddle.toml` with environment variable overrides via the
//! `HUDDLE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::HuddleConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/huddle/huddle.toml` (system-wide)
/// 3. `~/.config/huddle/huddle.toml` (user XDG config)
/// 4. `./huddle.toml` (local directory)
/// 5. `HUDDLE_*` environment variables
pub fn load_config() -> Result<HuddleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HuddleConfig::default()))
        .merge(Toml::file("/etc/huddle/huddle.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("huddle/huddle.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("huddle.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<HuddleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HuddleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HuddleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HuddleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `HUDDLE_SCHEDULER_DEBOUNCE_WINDOW_SECS`
/// must map to `scheduler.debounce_window_secs`, not `scheduler.debounce.window.secs`.
fn env_provider() -> Env {
    Env::prefixed("HUDDLE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("scheduler_", "scheduler.", 1)
            .replacen("recovery_", "recovery.", 1)
            .replacen("watchdog_", "watchdog.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("dispatcher_", "dispatcher.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}
