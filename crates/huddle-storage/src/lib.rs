// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Huddle dispatch scheduler.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! operations for message batches, per-ticket debounce windows, and
//! ticket resolution.
//!
//! The store is the system's only synchronization primitive: every claim
//! is a single conditional `UPDATE` whose affected-row count decides
//! ownership. Read-then-write in two steps is never used for claims.

pub mod clock;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use clock::{now_rfc3339, parse_rfc3339, rfc3339_after, rfc3339_after_millis};
pub use database::Database;
pub use models::*;
