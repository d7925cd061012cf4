// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Huddle dispatch scheduler.
//!
//! Huddle coalesces bursts of inbound chat messages per conversation and
//! triggers exactly one downstream assistant dispatch per quiet period.
//! This crate provides the error taxonomy and the domain types shared by
//! the storage, scheduler, and gateway crates.

pub mod error;
pub mod types;

pub use error::HuddleError;
pub use types::{
    BatchCounters, BatchId, DebounceState, MessageBatch, RawMessage, SweepTrigger, Ticket,
    TicketId, WorkerOutcome,
};
