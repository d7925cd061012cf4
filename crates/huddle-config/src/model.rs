// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Huddle scheduler.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Huddle configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HuddleConfig {
    /// Debounce and sweep behavior.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Orphan recovery thresholds.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Client-side emergency watchdog.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Assistant dispatcher endpoint.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Admin gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Debounce window and sweep behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Quiet period after the last message before dispatch, in seconds.
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: i64,

    /// Maximum batches examined per sweep.
    #[serde(default = "default_sweep_limit")]
    pub sweep_limit: i64,

    /// Maximum due windows fired per cron scan.
    #[serde(default = "default_cron_scan_limit")]
    pub cron_scan_limit: i64,

    /// Worker wait-loop poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Cap on one worker invocation's total wait, in seconds. The worker
    /// self-terminates when this elapses even if the window kept moving.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Fresh deadline applied when re-arming after a failed dispatch,
    /// in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: i64,

    /// Consecutive failed dispatches tolerated per window before the
    /// ticket is left disarmed for recovery to pick up.
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: i64,

    /// Interval between server-side cron ticks (sweep + cron scan),
    /// in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_window_secs: default_debounce_window_secs(),
            sweep_limit: default_sweep_limit(),
            cron_scan_limit: default_cron_scan_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_debounce_window_secs() -> i64 {
    10
}

fn default_sweep_limit() -> i64 {
    25
}

fn default_cron_scan_limit() -> i64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_max_wait_secs() -> u64 {
    30
}

fn default_retry_delay_secs() -> i64 {
    15
}

fn default_max_dispatch_attempts() -> i64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Orphan recovery thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
    /// Age past which an unclaimed batch or stale claim counts as an
    /// orphan for the server-side sweep, in seconds.
    #[serde(default = "default_orphan_age_secs")]
    pub orphan_age_secs: i64,

    /// Horizon past which unprocessed batches are force-marked processed
    /// to stop starvation, in seconds.
    #[serde(default = "default_force_processed_horizon_secs")]
    pub force_processed_horizon_secs: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            orphan_age_secs: default_orphan_age_secs(),
            force_processed_horizon_secs: default_force_processed_horizon_secs(),
        }
    }
}

fn default_orphan_age_secs() -> i64 {
    300
}

fn default_force_processed_horizon_secs() -> i64 {
    86_400
}

/// Client-side emergency watchdog. Redundant with the recovery sweep --
/// defense-in-depth against missed server-side cron ticks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Whether the watchdog task runs at all.
    #[serde(default = "default_watchdog_enabled")]
    pub enabled: bool,

    /// Tick cadence in seconds.
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,

    /// Age past which an unclaimed batch triggers an emergency sweep,
    /// in seconds. Much shorter than the server-side threshold.
    #[serde(default = "default_watchdog_orphan_age_secs")]
    pub orphan_age_secs: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_watchdog_enabled(),
            interval_secs: default_watchdog_interval_secs(),
            orphan_age_secs: default_watchdog_orphan_age_secs(),
        }
    }
}

fn default_watchdog_enabled() -> bool {
    true
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_watchdog_orphan_age_secs() -> i64 {
    5
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("huddle").join("huddle.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("huddle.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Assistant dispatcher endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Endpoint URL notified on each fire. `None` disables real dispatch
    /// (fires are logged and counted only), useful for dry runs.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

/// Admin gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the admin surface (`None` = auth disabled).
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8790
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
