// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orphan recovery and health monitoring.
//!
//! Policy: no batch may remain unclaimed, and no armed window unfired,
//! beyond a bounded staleness threshold. Recovery exists purely to
//! restore that bound after crashes; the happy path never needs it.

use std::sync::Arc;

use huddle_core::{HuddleError, SweepTrigger};
use huddle_storage::{BatchCounters, now_rfc3339, queries, rfc3339_after};
use serde::Serialize;
use tracing::{info, warn};

use crate::scanner::{ScanParams, Scanner, SweepReport};
use crate::{SchedulerContext, metrics};

/// Aggregate health counters for operator visibility.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Pending / processing / orphaned batch counts.
    pub batches: BatchCounters,
    /// Armed windows past the staleness cutoff.
    pub stuck_windows: i64,
    /// Tickets disarmed with an exhausted dispatch retry budget.
    pub exhausted_tickets: Vec<String>,
}

/// Summary of one recovery pass.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    /// Starved batches force-marked processed (past the 24h horizon).
    pub force_processed: i64,
    /// Stale claims released back to claimable.
    pub claims_released: i64,
    /// Exhausted tickets re-armed with a fresh retry budget.
    pub windows_rearmed: usize,
    /// The orphan sweep run immediately after repair.
    pub sweep: SweepReport,
}

/// Repairs invariant violations and reports health.
pub struct Recovery {
    ctx: Arc<SchedulerContext>,
    scanner: Scanner,
}

impl Recovery {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        let scanner = Scanner::new(ctx.clone());
        Self { ctx, scanner }
    }

    /// Current health counters.
    pub async fn monitor(&self) -> Result<HealthSnapshot, HuddleError> {
        let cutoff = rfc3339_after(-self.ctx.recovery.orphan_age_secs);
        let batches = queries::batches::counters(&self.ctx.db, &cutoff).await?;
        let stuck_windows = queries::debounce::count_stuck(&self.ctx.db, &cutoff).await?;
        let exhausted_tickets = queries::debounce::exhausted_tickets(
            &self.ctx.db,
            self.ctx.scheduler.max_dispatch_attempts,
            50,
        )
        .await?;

        metrics::set_batch_gauges(batches.pending as f64, batches.processing as f64);
        metrics::set_stuck_windows(stuck_windows as f64);

        Ok(HealthSnapshot {
            batches,
            stuck_windows,
            exhausted_tickets,
        })
    }

    /// Repair known invariant violations, then sweep orphans immediately.
    pub async fn run_recovery(&self) -> Result<RecoveryReport, HuddleError> {
        let now = now_rfc3339();

        // Batches unprocessed past the horizon are force-closed to stop
        // starvation loops.
        let horizon = rfc3339_after(-self.ctx.recovery.force_processed_horizon_secs);
        let force_processed =
            queries::batches::force_process_older_than(&self.ctx.db, &horizon, &now).await?;
        if force_processed > 0 {
            warn!(count = force_processed, "force-processed starved batches");
        }

        // Claims held past the staleness threshold belong to crashed
        // scanners; release them so the sweep below can re-claim.
        let stale_cutoff = rfc3339_after(-self.ctx.recovery.orphan_age_secs);
        let claims_released =
            queries::batches::clear_stale_claims(&self.ctx.db, &stale_cutoff, &now).await?;
        if claims_released > 0 {
            metrics::record_orphan_claims_released(claims_released as u64);
        }

        // Tickets stranded by an exhausted retry budget get a fresh one.
        let exhausted = queries::debounce::exhausted_tickets(
            &self.ctx.db,
            self.ctx.scheduler.max_dispatch_attempts,
            self.ctx.scheduler.sweep_limit,
        )
        .await?;
        let windows_rearmed = exhausted.len();
        for ticket_id in &exhausted {
            let until = rfc3339_after(self.ctx.scheduler.retry_delay_secs);
            queries::debounce::arm_or_extend(&self.ctx.db, ticket_id, &until, &now).await?;
            warn!(ticket_id = %ticket_id, "re-armed ticket with exhausted retry budget");
        }

        let sweep = self
            .scanner
            .run_sweep(&ScanParams::orphans_only(
                &self.ctx,
                SweepTrigger::Recovery,
                self.ctx.recovery.orphan_age_secs,
            ))
            .await?;

        info!(
            force_processed,
            claims_released, windows_rearmed, "recovery pass complete"
        );

        Ok(RecoveryReport {
            force_processed,
            claims_released,
            windows_rearmed,
            sweep,
        })
    }

    /// Unconditional sweep bypassing the orphan filter.
    pub async fn force_sweep(&self) -> Result<SweepReport, HuddleError> {
        self.scanner
            .run_sweep(&ScanParams::from_context(&self.ctx, SweepTrigger::Manual))
            .await
    }

    /// Release stale claims only, returning the count of reclaimed rows.
    pub async fn cleanup_orphans(&self) -> Result<i64, HuddleError> {
        let cutoff = rfc3339_after(-self.ctx.recovery.orphan_age_secs);
        let released =
            queries::batches::clear_stale_claims(&self.ctx.db, &cutoff, &now_rfc3339()).await?;
        if released > 0 {
            metrics::record_orphan_claims_released(released as u64);
        }
        Ok(released)
    }
}
