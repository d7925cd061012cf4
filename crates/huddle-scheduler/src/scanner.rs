// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch scanner/claimer.
//!
//! Sweeps unclaimed batches, claims each via a conditional update,
//! resolves the owning ticket, arms or extends its debounce window, and
//! fire-and-forgets a worker invocation. Losing a claim is silent; the
//! winner alone proceeds. Per-batch failures are logged and skipped --
//! a sweep never aborts over one bad candidate.

use std::sync::Arc;

use huddle_core::{HuddleError, SweepTrigger};
use huddle_storage::{MessageBatch, now_rfc3339, queries, rfc3339_after};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{SchedulerContext, metrics, worker};

/// Parameters for one sweep, defaulted from config per trigger.
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Maximum batches examined.
    pub limit: i64,
    /// Window applied when arming/extending, in seconds.
    pub debounce_window_secs: i64,
    /// Restrict to batches older than `orphan_age_secs`.
    pub only_orphaned: bool,
    /// Staleness threshold for the orphan filter, in seconds.
    pub orphan_age_secs: i64,
    /// What initiated the sweep (logs and metrics).
    pub trigger: SweepTrigger,
}

impl ScanParams {
    /// Sweep parameters as configured, for the given trigger.
    pub fn from_context(ctx: &SchedulerContext, trigger: SweepTrigger) -> Self {
        Self {
            limit: ctx.scheduler.sweep_limit,
            debounce_window_secs: ctx.scheduler.debounce_window_secs,
            only_orphaned: false,
            orphan_age_secs: ctx.recovery.orphan_age_secs,
            trigger,
        }
    }

    /// Same, but restricted to orphans older than `orphan_age_secs`.
    pub fn orphans_only(ctx: &SchedulerContext, trigger: SweepTrigger, orphan_age_secs: i64) -> Self {
        Self {
            only_orphaned: true,
            orphan_age_secs,
            ..Self::from_context(ctx, trigger)
        }
    }
}

/// What one sweep did, returned to the caller and the admin surface.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    /// Candidates selected for this sweep.
    pub examined: usize,
    /// Claims won.
    pub claimed: usize,
    /// Windows armed or extended (and workers spawned).
    pub armed: usize,
    /// Batches processed without a window (no ticket resolved).
    pub dropped: usize,
    /// Claims lost to a concurrent scanner.
    pub lost_races: usize,
    /// Candidates that errored and were skipped.
    pub failed: usize,
}

enum CandidateOutcome {
    Armed,
    Dropped,
    LostRace,
}

/// Claims batches and hands conversations to the debounce resolver.
///
/// Many scanners may run concurrently against the same store; the
/// conditional claim keeps them from double-processing.
pub struct Scanner {
    ctx: Arc<SchedulerContext>,
    /// Claimant identity recorded on every claim this scanner wins.
    identity: String,
}

impl Scanner {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self {
            ctx,
            identity: format!("scanner-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Run one sweep with the given parameters.
    pub async fn run_sweep(&self, params: &ScanParams) -> Result<SweepReport, HuddleError> {
        let cutoff = params
            .only_orphaned
            .then(|| rfc3339_after(-params.orphan_age_secs));
        let candidates =
            queries::batches::select_unclaimed(&self.ctx.db, params.limit, cutoff.as_deref())
                .await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for batch in candidates {
            let batch_id = batch.id.clone();
            match self.process_candidate(batch, params).await {
                Ok(CandidateOutcome::Armed) => {
                    report.claimed += 1;
                    report.armed += 1;
                }
                Ok(CandidateOutcome::Dropped) => {
                    report.claimed += 1;
                    report.dropped += 1;
                }
                Ok(CandidateOutcome::LostRace) => report.lost_races += 1,
                Err(e) => {
                    error!(batch_id = %batch_id, error = %e, "batch failed during sweep; continuing");
                    report.failed += 1;
                }
            }
        }

        info!(
            trigger = %params.trigger,
            examined = report.examined,
            claimed = report.claimed,
            armed = report.armed,
            dropped = report.dropped,
            failed = report.failed,
            "sweep complete"
        );
        Ok(report)
    }

    async fn process_candidate(
        &self,
        batch: MessageBatch,
        params: &ScanParams,
    ) -> Result<CandidateOutcome, HuddleError> {
        let now = now_rfc3339();
        if !queries::batches::claim(&self.ctx.db, &batch.id, &self.identity, &now).await? {
            debug!(batch_id = %batch.id, "claim lost to a concurrent scanner");
            return Ok(CandidateOutcome::LostRace);
        }
        metrics::record_claim(&params.trigger.to_string());

        let ticket =
            queries::tickets::resolve(&self.ctx.db, &batch.chat_id, &batch.client_id).await?;
        let Some(ticket) = ticket else {
            // No ticket for this chat: mark processed without arming a
            // window. The conversation may simply not be provisioned yet.
            warn!(
                batch_id = %batch.id,
                chat_id = %batch.chat_id,
                client_id = %batch.client_id,
                "no ticket resolved; dropping batch"
            );
            metrics::record_drop();
            queries::batches::mark_processed(&self.ctx.db, &batch.id, &now_rfc3339()).await?;
            return Ok(CandidateOutcome::Dropped);
        };

        let until = rfc3339_after(params.debounce_window_secs);
        queries::debounce::arm_or_extend(&self.ctx.db, &ticket.id, &until, &now_rfc3339()).await?;
        metrics::record_armed();
        queries::batches::mark_processed(&self.ctx.db, &batch.id, &now_rfc3339()).await?;

        debug!(
            batch_id = %batch.id,
            ticket_id = %ticket.id,
            debounce_until = %until,
            "batch handed off; window armed"
        );

        // Fire-and-forget: the cron sweep is the safety net if this
        // invocation is lost.
        let ctx = self.ctx.clone();
        let ticket_id = ticket.id.clone();
        tokio::spawn(async move {
            if let Err(e) = worker::process_ticket(&ctx, &ticket_id).await {
                debug!(ticket_id = %ticket_id, error = %e, "direct worker invocation failed");
            }
        });

        Ok(CandidateOutcome::Armed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDispatcher, context, fast_config, seed_message, seed_ticket, test_db};
    use huddle_storage::rfc3339_after;

    #[tokio::test]
    async fn sweep_claims_arms_and_dispatches_once_per_burst() {
        let (db, _dir) = test_db().await;
        seed_ticket(&db, "tk-1", "555", "client-1").await;
        // Two messages in one burst land in one open batch.
        let b1 = seed_message(&db, "555@c.us", "client-1", "first").await;
        let b2 = seed_message(&db, "555@c.us", "client-1", "second").await;
        assert_eq!(b1, b2);

        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());
        let scanner = Scanner::new(ctx.clone());

        let report = scanner
            .run_sweep(&ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Manual))
            .await
            .unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(report.armed, 1);
        assert_eq!(report.dropped, 0);

        // Batch is terminal and the window is armed.
        let batch = queries::batches::get_batch(&db, &b1).await.unwrap().unwrap();
        assert!(batch.processed_at.is_some());
        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert!(state.scheduled);

        // The spawned worker waits out the 1s window, then fires exactly once.
        tokio::time::sleep(std::time::Duration::from_millis(1600)).await;
        assert_eq!(dispatcher.count(), 1);
        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert!(!state.scheduled, "window consumed by the fire-claim");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unresolvable_chat_is_dropped_without_a_window() {
        let (db, _dir) = test_db().await;
        let batch_id = seed_message(&db, "unknown@c.us", "client-1", "hello?").await;

        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());
        let scanner = Scanner::new(ctx.clone());

        let report = scanner
            .run_sweep(&ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Manual))
            .await
            .unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.armed, 0);

        let batch = queries::batches::get_batch(&db, &batch_id)
            .await
            .unwrap()
            .unwrap();
        assert!(batch.processed_at.is_some(), "drop is terminal, not retried");

        // No window, no dispatch -- ever.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(dispatcher.count(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_sweep_reports_zeros() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());
        let scanner = Scanner::new(ctx.clone());

        let report = scanner
            .run_sweep(&ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Cron))
            .await
            .unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(report.claimed, 0);
        assert_eq!(dispatcher.count(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn orphan_sweep_skips_fresh_batches() {
        let (db, _dir) = test_db().await;
        seed_ticket(&db, "tk-1", "555", "client-1").await;
        seed_message(&db, "555@c.us", "client-1", "fresh").await;

        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());
        let scanner = Scanner::new(ctx.clone());

        let report = scanner
            .run_sweep(&ScanParams::orphans_only(
                &ctx,
                huddle_core::SweepTrigger::Emergency,
                300,
            ))
            .await
            .unwrap();
        assert_eq!(report.examined, 0, "fresh batch is not an orphan");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_sweeps_claim_each_batch_once() {
        let (db, _dir) = test_db().await;
        seed_ticket(&db, "tk-1", "555", "client-1").await;
        seed_message(&db, "555@c.us", "client-1", "hi").await;

        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        // Two scanners race over the same candidate set.
        let scanner_a = Scanner::new(ctx.clone());
        let scanner_b = Scanner::new(ctx.clone());
        let params_a = ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Cron);
        let params_b = ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Emergency);
        let (a, b) = tokio::join!(
            scanner_a.run_sweep(&params_a),
            scanner_b.run_sweep(&params_b),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.claimed + b.claimed, 1, "one claim total across both sweeps");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn later_batch_extends_the_window_not_a_second_one() {
        let (db, _dir) = test_db().await;
        seed_ticket(&db, "tk-1", "555", "client-1").await;

        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());
        let scanner = Scanner::new(ctx.clone());
        let params = ScanParams::from_context(&ctx, huddle_core::SweepTrigger::Cron);

        seed_message(&db, "555@c.us", "client-1", "first").await;
        scanner.run_sweep(&params).await.unwrap();
        let first_until = queries::debounce::get_state(&db, "tk-1")
            .await
            .unwrap()
            .unwrap()
            .debounce_until;

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        // Second message lands in a NEW batch (first was claimed) and
        // extends the same window.
        seed_message(&db, "555@c.us", "client-1", "second").await;
        scanner.run_sweep(&params).await.unwrap();
        let second_until = queries::debounce::get_state(&db, "tk-1")
            .await
            .unwrap()
            .unwrap()
            .debounce_until;
        assert!(second_until > first_until, "trailing-edge extension");

        // Exactly one dispatch, after the extended deadline.
        tokio::time::sleep(std::time::Duration::from_millis(1600)).await;
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        let fired_at = calls[0].1;
        let deadline = huddle_storage::parse_rfc3339(&second_until).unwrap();
        assert!(fired_at >= deadline, "dispatch waits for the latest deadline");
        assert!(rfc3339_after(0) >= second_until);

        db.close().await.unwrap();
    }
}
