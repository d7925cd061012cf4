// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Huddle scheduler workspace.
//!
//! Entity structs mirror the storage rows one-to-one; timestamps are
//! RFC 3339 UTC strings with millisecond precision, which compare
//! lexicographically in the same order as the instants they denote.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

/// Unique identifier for a message batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

/// What initiated a scanner sweep. Carried through logs and metrics so
/// operators can tell the happy path from the safety nets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SweepTrigger {
    /// Periodic server-side sweep.
    Cron,
    /// Operator-initiated via the admin surface.
    Manual,
    /// Client-side watchdog detected stale unclaimed batches.
    Emergency,
    /// Repair pass after invariant violations were resolved.
    Recovery,
}

/// One raw inbound message inside a batch. The scheduler never inspects
/// content; it is carried opaquely for the assistant to re-read on fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Transport-level message id.
    pub id: String,
    /// Opaque payload as received from the transport.
    pub body: String,
    /// RFC 3339 arrival timestamp.
    pub received_at: String,
}

/// An accumulating group of messages for one chat awaiting a coalesced
/// dispatch.
///
/// At most one claimant ever sets `processing_started_at` (enforced by a
/// conditional single-row update, not a lock table). Once `processed_at`
/// is set the record is terminal. "Processed" means handed off to the
/// debounce window, not answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub id: String,
    /// Chat identifier as produced by the transport (suffixes intact).
    pub chat_id: String,
    /// Owning client identifier.
    pub client_id: String,
    /// Transport instance identifier.
    pub instance_id: String,
    /// Append-only ordered sequence of raw messages, JSON-encoded.
    pub messages: Vec<RawMessage>,
    pub created_at: String,
    pub last_updated: String,
    /// Claim marker; `None` until a scanner wins the claim.
    pub processing_started_at: Option<String>,
    /// Identity of the claimant that won the conditional update.
    pub processing_by: Option<String>,
    /// Completion marker; terminal once set.
    pub processed_at: Option<String>,
}

/// Per-ticket debounce window state. Exactly one row per ticket.
///
/// A new batch before `debounce_until` extends the deadline rather than
/// opening a second window (trailing-edge debounce).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceState {
    pub ticket_id: String,
    /// Whether the window is armed. Flips false on a won fire-claim.
    pub scheduled: bool,
    /// Deadline after which the window may fire.
    pub debounce_until: String,
    /// Consecutive failed dispatches for the current window.
    pub dispatch_attempts: i64,
    pub last_updated: String,
}

/// Conversation-level entity owned by the external ticketing subsystem.
/// The scheduler only reads it to map chat identifiers to tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// Canonicalized chat key (transport suffixes stripped).
    pub chat_key: String,
    pub client_id: String,
    pub instance_id: String,
    pub created_at: String,
}

/// Aggregate batch counts for health monitoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchCounters {
    /// Unclaimed and unprocessed.
    pub pending: i64,
    /// Claimed but not yet marked processed.
    pub processing: i64,
    /// Pending batches older than the staleness cutoff.
    pub orphaned: i64,
}

/// Result of one worker invocation for a ticket. All variants except
/// `Dispatched` and `Rearmed` are benign no-ops by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WorkerOutcome {
    /// Won the fire-claim and notified the assistant dispatcher.
    Dispatched,
    /// No debounce row exists for the ticket -- nothing to do.
    NoDebounceState,
    /// Lost the fire-claim race, or the window was re-extended between
    /// the wait exit and the claim attempt.
    LockNotAcquired,
    /// The invocation's wait budget elapsed while the window was still
    /// being extended; a later sweep will fire it.
    WaitBudgetExhausted,
    /// Dispatch failed; the window was re-armed with a fresh short deadline.
    Rearmed { attempts: i64 },
    /// Dispatch failed and the attempt cap was reached; the window stays
    /// disarmed until a new batch or recovery re-arms it.
    AttemptsExhausted { attempts: i64 },
}
