// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Huddle batch debounce/coalescing scheduler.
//!
//! Inbound chat messages accumulate in batches; this crate decides when
//! and exactly-once-per-window a conversation's burst is handed to the
//! external assistant dispatcher, and recovers when that hand-off is
//! lost:
//!
//! - [`scanner`] claims unclaimed batches and arms/extends per-ticket
//!   debounce windows;
//! - [`worker`] waits out a window (honoring mid-wait extensions), wins
//!   the fire-claim, and dispatches;
//! - [`recovery`] repairs invariant violations and exposes health
//!   counters;
//! - [`watchdog`] mirrors the recovery sweep at a faster cadence as
//!   defense-in-depth against missed cron ticks.
//!
//! There is no coordinator process and no in-memory shared state between
//! invocations: every mutual exclusion is a conditional single-row update
//! in the store.

pub mod dispatch;
pub mod metrics;
pub mod recovery;
pub mod scanner;
pub mod watchdog;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use huddle_config::model::{RecoveryConfig, SchedulerConfig};
use huddle_storage::Database;

pub use dispatch::{AssistantDispatcher, HttpDispatcher, NoopDispatcher};
pub use recovery::{HealthSnapshot, Recovery, RecoveryReport};
pub use scanner::{ScanParams, Scanner, SweepReport};
pub use watchdog::Watchdog;
pub use worker::{CronScanReport, process_ticket, run_cron_scan};

/// Shared collaborators for all scheduler components.
///
/// Cheap to clone via `Arc`; holds no mutable state of its own -- the
/// store is the only state.
pub struct SchedulerContext {
    pub db: Database,
    pub dispatcher: Arc<dyn AssistantDispatcher>,
    pub scheduler: SchedulerConfig,
    pub recovery: RecoveryConfig,
}

impl SchedulerContext {
    pub fn new(
        db: Database,
        dispatcher: Arc<dyn AssistantDispatcher>,
        scheduler: SchedulerConfig,
        recovery: RecoveryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            dispatcher,
            scheduler,
            recovery,
        })
    }
}
