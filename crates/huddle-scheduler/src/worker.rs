// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounce resolver and batch worker.
//!
//! One invocation handles one ticket: wait out the debounce window,
//! re-reading the deadline every poll because a concurrent scanner may
//! extend it mid-wait, then try to win the fire-claim and dispatch.
//! Each invocation self-terminates within the wait budget regardless of
//! outcome; the cron scan sweeps up anything a lost invocation leaves
//! behind.

use std::time::Duration;

use chrono::Utc;
use huddle_core::{HuddleError, WorkerOutcome};
use huddle_storage::{now_rfc3339, parse_rfc3339, queries, rfc3339_after};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{SchedulerContext, metrics};

/// Process one ticket's debounce window to completion.
///
/// Trailing-edge semantics: the wait tracks the *latest* observed
/// `debounce_until`, so dispatch happens one full window after the last
/// message of the burst, never the first.
pub async fn process_ticket(
    ctx: &SchedulerContext,
    ticket_id: &str,
) -> Result<WorkerOutcome, HuddleError> {
    let poll = Duration::from_millis(ctx.scheduler.poll_interval_ms);
    let wait_budget = Duration::from_secs(ctx.scheduler.max_wait_secs);
    let started = Instant::now();

    loop {
        let Some(state) = queries::debounce::get_state(&ctx.db, ticket_id).await? else {
            debug!(ticket_id, "no debounce state; nothing to fire");
            return Ok(WorkerOutcome::NoDebounceState);
        };
        if !state.scheduled {
            // Another worker already fired this window.
            debug!(ticket_id, "window already consumed");
            return Ok(WorkerOutcome::LockNotAcquired);
        }

        let deadline = parse_rfc3339(&state.debounce_until)?;
        let now = Utc::now();
        if now >= deadline {
            break;
        }

        if started.elapsed() >= wait_budget {
            debug!(
                ticket_id,
                debounce_until = %state.debounce_until,
                "wait budget exhausted; leaving the window for a later sweep"
            );
            return Ok(WorkerOutcome::WaitBudgetExhausted);
        }

        let remaining = (deadline - now).to_std().unwrap_or_default();
        tokio::time::sleep(remaining.min(poll)).await;
    }

    // The window looked expired a moment ago, but only the conditional
    // update decides: a re-extension or a faster worker makes this lose.
    if !queries::debounce::claim_fire(&ctx.db, ticket_id, &now_rfc3339()).await? {
        debug!(ticket_id, "fire-claim not acquired");
        return Ok(WorkerOutcome::LockNotAcquired);
    }

    match ctx.dispatcher.dispatch(ticket_id).await {
        Ok(()) => {
            queries::debounce::reset_attempts(&ctx.db, ticket_id, &now_rfc3339()).await?;
            metrics::record_dispatch();
            info!(ticket_id, "burst dispatched");
            Ok(WorkerOutcome::Dispatched)
        }
        Err(e) => {
            warn!(ticket_id, error = %e, "dispatch failed; re-arming for retry");
            metrics::record_dispatch_failure();
            let until = rfc3339_after(ctx.scheduler.retry_delay_secs);
            let rearmed = queries::debounce::rearm_for_retry(
                &ctx.db,
                ticket_id,
                &until,
                ctx.scheduler.max_dispatch_attempts,
                &now_rfc3339(),
            )
            .await?;
            match rearmed {
                Some(attempts) => Ok(WorkerOutcome::Rearmed { attempts }),
                None => {
                    warn!(
                        ticket_id,
                        max_attempts = ctx.scheduler.max_dispatch_attempts,
                        "dispatch retry budget exhausted; window left disarmed"
                    );
                    metrics::record_attempts_exhausted();
                    Ok(WorkerOutcome::AttemptsExhausted {
                        attempts: ctx.scheduler.max_dispatch_attempts,
                    })
                }
            }
        }
    }
}

/// What one cron scan did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CronScanReport {
    /// Due windows selected.
    pub examined: usize,
    /// Windows fired and dispatched.
    pub dispatched: usize,
    /// Benign no-ops (lost races, vanished state, exhausted waits).
    pub skipped: usize,
    /// Windows re-armed after a failed dispatch.
    pub rearmed: usize,
    /// Tickets that errored.
    pub failed: usize,
}

/// Bulk-sweep all due windows, sequentially and bounded.
///
/// The safety net for lost direct worker invocations: anything armed and
/// past its deadline gets fired here on the next cron tick.
pub async fn run_cron_scan(ctx: &SchedulerContext) -> Result<CronScanReport, HuddleError> {
    let due = queries::debounce::due_tickets(
        &ctx.db,
        &now_rfc3339(),
        ctx.scheduler.cron_scan_limit,
    )
    .await?;

    let mut report = CronScanReport {
        examined: due.len(),
        ..CronScanReport::default()
    };

    for ticket_id in due {
        match process_ticket(ctx, &ticket_id).await {
            Ok(WorkerOutcome::Dispatched) => report.dispatched += 1,
            Ok(WorkerOutcome::Rearmed { .. }) => report.rearmed += 1,
            Ok(_) => report.skipped += 1,
            Err(e) => {
                error!(ticket_id = %ticket_id, error = %e, "cron scan ticket failed; continuing");
                report.failed += 1;
            }
        }
    }

    if report.examined > 0 {
        info!(
            examined = report.examined,
            dispatched = report.dispatched,
            rearmed = report.rearmed,
            "cron scan complete"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FlakyDispatcher, RecordingDispatcher, context, fast_config, test_db,
    };
    use huddle_storage::rfc3339_after_millis;

    #[tokio::test]
    async fn missing_state_is_a_noop() {
        let (db, _dir) = test_db().await;
        let ctx = context(db.clone(), RecordingDispatcher::new(), fast_config());

        let outcome = process_ticket(&ctx, "ghost").await.unwrap();
        assert_eq!(outcome, WorkerOutcome::NoDebounceState);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn waits_out_the_window_then_dispatches() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        let until = rfc3339_after_millis(400);
        queries::debounce::arm_or_extend(&db, "tk-1", &until, &now_rfc3339())
            .await
            .unwrap();

        let outcome = process_ticket(&ctx, "tk-1").await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Dispatched);

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "tk-1");
        assert!(
            calls[0].1 >= parse_rfc3339(&until).unwrap(),
            "never fires before the deadline"
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mid_wait_extension_moves_the_dispatch() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        queries::debounce::arm_or_extend(&db, "tk-1", &rfc3339_after_millis(400), &now_rfc3339())
            .await
            .unwrap();

        let worker = {
            let ctx = ctx.clone();
            tokio::spawn(async move { process_ticket(&ctx, "tk-1").await.unwrap() })
        };

        // While the worker waits, a new batch extends the window.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let extended_until = rfc3339_after_millis(700);
        queries::debounce::arm_or_extend(&db, "tk-1", &extended_until, &now_rfc3339())
            .await
            .unwrap();

        let outcome = worker.await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Dispatched);

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1, "extension reschedules, it does not stack");
        assert!(
            calls[0].1 >= parse_rfc3339(&extended_until).unwrap(),
            "the latest observed deadline wins"
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn racing_workers_fire_exactly_once() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        queries::debounce::arm_or_extend(&db, "tk-1", &rfc3339_after_millis(-10), &now_rfc3339())
            .await
            .unwrap();

        let (a, b) = tokio::join!(process_ticket(&ctx, "tk-1"), process_ticket(&ctx, "tk-1"));
        let outcomes = [a.unwrap(), b.unwrap()];

        let dispatched = outcomes
            .iter()
            .filter(|o| **o == WorkerOutcome::Dispatched)
            .count();
        let lost = outcomes
            .iter()
            .filter(|o| **o == WorkerOutcome::LockNotAcquired)
            .count();
        assert_eq!(dispatched, 1);
        assert_eq!(lost, 1);
        assert_eq!(dispatcher.count(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wait_budget_bounds_the_invocation() {
        let (db, _dir) = test_db().await;
        let mut config = fast_config();
        config.max_wait_secs = 0;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), config);

        // Window far in the future: this invocation gives up instead of
        // blocking past its budget.
        queries::debounce::arm_or_extend(&db, "tk-1", &rfc3339_after(60), &now_rfc3339())
            .await
            .unwrap();

        let outcome = process_ticket(&ctx, "tk-1").await.unwrap();
        assert_eq!(outcome, WorkerOutcome::WaitBudgetExhausted);
        assert_eq!(dispatcher.count(), 0);

        // Still armed for a later sweep.
        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert!(state.scheduled);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_dispatch_rearms_and_a_sweep_retries() {
        let (db, _dir) = test_db().await;
        let dispatcher = FlakyDispatcher::new(1);
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        queries::debounce::arm_or_extend(&db, "tk-1", &rfc3339_after_millis(-10), &now_rfc3339())
            .await
            .unwrap();

        let outcome = process_ticket(&ctx, "tk-1").await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Rearmed { attempts: 1 });

        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert!(state.scheduled, "re-armed with a fresh deadline");

        // retry_delay_secs = 0: due immediately for the next cron scan.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = run_cron_scan(&ctx).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            dispatcher.attempts.load(std::sync::atomic::Ordering::SeqCst),
            2
        );

        // Attempt counter cleared on success.
        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert_eq!(state.dispatch_attempts, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn persistent_failures_stop_at_the_attempt_cap() {
        let (db, _dir) = test_db().await;
        let mut config = fast_config();
        config.max_dispatch_attempts = 2;
        let dispatcher = FlakyDispatcher::new(usize::MAX);
        let ctx = context(db.clone(), dispatcher.clone(), config);

        queries::debounce::arm_or_extend(&db, "tk-1", &rfc3339_after_millis(-10), &now_rfc3339())
            .await
            .unwrap();

        assert_eq!(
            process_ticket(&ctx, "tk-1").await.unwrap(),
            WorkerOutcome::Rearmed { attempts: 1 }
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            process_ticket(&ctx, "tk-1").await.unwrap(),
            WorkerOutcome::Rearmed { attempts: 2 }
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            process_ticket(&ctx, "tk-1").await.unwrap(),
            WorkerOutcome::AttemptsExhausted { attempts: 2 }
        );

        // Disarmed: no more retries until something re-arms it.
        let state = queries::debounce::get_state(&db, "tk-1").await.unwrap().unwrap();
        assert!(!state.scheduled);
        let report = run_cron_scan(&ctx).await.unwrap();
        assert_eq!(report.examined, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cron_scan_with_nothing_due_is_idempotent() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        // One future window, one already fired.
        queries::debounce::arm_or_extend(&db, "future", &rfc3339_after(60), &now_rfc3339())
            .await
            .unwrap();

        let report = run_cron_scan(&ctx).await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(report.dispatched, 0);
        assert_eq!(dispatcher.count(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cron_scan_fires_stuck_windows() {
        let (db, _dir) = test_db().await;
        let dispatcher = RecordingDispatcher::new();
        let ctx = context(db.clone(), dispatcher.clone(), fast_config());

        // Armed long ago and never fired -- the lost-invocation case.
        queries::debounce::arm_or_extend(&db, "stuck-1", &rfc3339_after(-600), &now_rfc3339())
            .await
            .unwrap();
        queries::debounce::arm_or_extend(&db, "stuck-2", &rfc3339_after(-300), &now_rfc3339())
            .await
            .unwrap();

        let report = run_cron_scan(&ctx).await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.dispatched, 2);
        assert_eq!(dispatcher.count(), 2);

        db.close().await.unwrap();
    }
}
