// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RFC 3339 timestamp helpers.
//!
//! All timestamps in the store are UTC strings with millisecond precision
//! (`2026-03-01T10:00:00.000Z`). The fixed width makes lexicographic
//! comparison inside SQLite agree with instant ordering, and computing
//! them on the Rust side lets tests inject arbitrary instants.

use chrono::{DateTime, Duration, Utc};
use huddle_core::HuddleError;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current instant as a store timestamp.
pub fn now_rfc3339() -> String {
    Utc::now().format(FORMAT).to_string()
}

/// Instant `secs` seconds from now (negative values yield past instants).
pub fn rfc3339_after(secs: i64) -> String {
    (Utc::now() + Duration::seconds(secs)).format(FORMAT).to_string()
}

/// Instant `ms` milliseconds from now.
pub fn rfc3339_after_millis(ms: i64) -> String {
    (Utc::now() + Duration::milliseconds(ms))
        .format(FORMAT)
        .to_string()
}

/// Parse a store timestamp back into a UTC instant.
pub fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, HuddleError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HuddleError::Internal(format!("malformed timestamp `{value}`: {e}")))
}
