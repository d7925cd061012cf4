// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side emergency watchdog.
//!
//! A supervised background task mirroring the recovery sweep at a much
//! faster cadence (seconds, not minutes). Intentionally redundant with
//! server-side recovery: it exists so a missed cron tick cannot strand a
//! conversation for long. Lifecycle is explicit -- start returns a join
//! handle, stop cancels through a token.

use std::sync::Arc;
use std::time::Duration;

use huddle_config::model::WatchdogConfig;
use huddle_core::{BatchCounters, HuddleError, SweepTrigger, WorkerOutcome};
use huddle_storage::{now_rfc3339, queries, rfc3339_after};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scanner::{ScanParams, Scanner, SweepReport};
use crate::{SchedulerContext, metrics, worker};

/// Supervised emergency sweep task plus operator actions.
pub struct Watchdog {
    ctx: Arc<SchedulerContext>,
    config: WatchdogConfig,
    token: CancellationToken,
}

impl Watchdog {
    pub fn new(ctx: Arc<SchedulerContext>, config: WatchdogConfig) -> Self {
        Self {
            ctx,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Spawn the background task. The returned handle completes after
    /// [`stop`](Self::stop) is called.
    pub fn start(&self) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let config = self.config.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(
                interval_secs = config.interval_secs,
                orphan_age_secs = config.orphan_age_secs,
                "watchdog started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("watchdog stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = Self::tick(&ctx, &config).await {
                            error!(error = %e, "watchdog tick failed");
                        }
                    }
                }
            }
        })
    }

    /// Signal the background task to exit at the next opportunity.
    pub fn stop(&self) {
        self.token.cancel();
    }

    async fn tick(
        ctx: &Arc<SchedulerContext>,
        config: &WatchdogConfig,
    ) -> Result<Option<SweepReport>, HuddleError> {
        let cutoff = rfc3339_after(-config.orphan_age_secs);
        let counters = queries::batches::counters(&ctx.db, &cutoff).await?;
        metrics::set_batch_gauges(counters.pending as f64, counters.processing as f64);

        if counters.orphaned == 0 {
            debug!(pending = counters.pending, "watchdog tick: nothing stale");
            return Ok(None);
        }

        warn!(
            orphaned = counters.orphaned,
            "unclaimed batches past the watchdog threshold; emergency sweep"
        );
        let scanner = Scanner::new(ctx.clone());
        let report = scanner
            .run_sweep(&ScanParams::orphans_only(
                ctx,
                SweepTrigger::Emergency,
                config.orphan_age_secs,
            ))
            .await?;
        Ok(Some(report))
    }

    // --- Operator actions ---

    /// Force-process one conversation's debounce immediately.
    pub async fn force_process(&self, ticket_id: &str) -> Result<WorkerOutcome, HuddleError> {
        worker::process_ticket(&self.ctx, ticket_id).await
    }

    /// Bulk orphan cleanup: release stale claims at the watchdog's (short)
    /// threshold. Returns the count of reclaimed rows.
    pub async fn cleanup_orphans(&self) -> Result<i64, HuddleError> {
        let cutoff = rfc3339_after(-self.config.orphan_age_secs);
        queries::batches::clear_stale_claims(&self.ctx.db, &cutoff, &now_rfc3339()).await
    }

    /// Current batch counters at the watchdog's threshold.
    pub async fn counters(&self) -> Result<BatchCounters, HuddleError> {
        let cutoff = rfc3339_after(-self.config.orphan_age_secs);
        queries::batches::counters(&self.ctx.db, &cutoff).await
    }
}
