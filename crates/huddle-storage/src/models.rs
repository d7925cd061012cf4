// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `huddle-core::types` for use across
//! crate boundaries. This module re-exports them for convenience within
//! the storage crate.

pub use huddle_core::types::{BatchCounters, DebounceState, MessageBatch, RawMessage, Ticket};
