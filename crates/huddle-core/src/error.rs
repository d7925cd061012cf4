// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Huddle dispatch scheduler.

use thiserror::Error;

/// The primary error type used across the Huddle workspace.
///
/// Benign race outcomes (losing a claim, missing debounce state) are not
/// errors -- they are [`WorkerOutcome`](crate::types::WorkerOutcome)
/// variants. This enum covers the failures that abort a unit of work.
#[derive(Debug, Error)]
pub enum HuddleError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Assistant dispatcher errors (endpoint unreachable, non-success status).
    /// Triggers the re-arm/retry path in the worker.
    #[error("dispatch error: {message}")]
    Dispatch {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Gateway errors (bind failure, serve failure).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
