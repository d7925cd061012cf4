// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The serve loop: wires storage, dispatcher, watchdog, periodic sweeps,
//! and the admin gateway together, then runs until SIGTERM/SIGINT.
//!
//! Two-tier dispatch design: the periodic sweep here is the safety net
//! for the scanner's fire-and-forget worker invocations, and the watchdog
//! mirrors it at a faster cadence. Neither tier assumes the other ran.

use std::sync::Arc;
use std::time::Duration;

use huddle_config::HuddleConfig;
use huddle_core::{HuddleError, SweepTrigger};
use huddle_gateway::{GatewayState, HealthState, ServerConfig, start_server};
use huddle_scheduler::{
    AssistantDispatcher, HttpDispatcher, NoopDispatcher, ScanParams, Scanner, SchedulerContext,
    Watchdog, metrics, worker,
};
use huddle_storage::Database;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run the scheduler until a shutdown signal arrives.
pub async fn run(config: HuddleConfig) -> Result<(), HuddleError> {
    init_tracing(&config.log.level);
    let shutdown = install_signal_handler();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| HuddleError::Internal(format!("failed to install metrics recorder: {e}")))?;
    metrics::register_metrics();

    let db = Database::open(&config.storage.database_path).await?;

    let dispatcher: Arc<dyn AssistantDispatcher> = match &config.dispatcher.endpoint_url {
        Some(url) => Arc::new(HttpDispatcher::new(
            url.clone(),
            Duration::from_secs(config.dispatcher.timeout_secs),
        )?),
        None => {
            warn!("no dispatcher.endpoint_url configured; dispatches are dry-run");
            Arc::new(NoopDispatcher)
        }
    };

    let ctx = SchedulerContext::new(
        db.clone(),
        dispatcher,
        config.scheduler.clone(),
        config.recovery.clone(),
    );

    let watchdog = config
        .watchdog
        .enabled
        .then(|| Watchdog::new(ctx.clone(), config.watchdog.clone()));
    let watchdog_handle = watchdog.as_ref().map(|w| w.start());

    let cron_handle = spawn_cron_loop(
        ctx.clone(),
        config.scheduler.sweep_interval_secs,
        shutdown.clone(),
    );

    let render = Arc::new(move || prometheus.render());
    let state = GatewayState {
        ctx: ctx.clone(),
        bearer_token: config.gateway.bearer_token.clone(),
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: Some(render),
        },
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    // Serves until the shutdown token cancels.
    start_server(&server_config, state, shutdown.clone()).await?;

    info!("draining background tasks");
    if let Some(w) = &watchdog {
        w.stop();
    }
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    let _ = cron_handle.await;
    db.close().await?;
    info!("shutdown complete");
    Ok(())
}

/// The server-side cron: a sweep plus a due-window scan per tick.
fn spawn_cron_loop(
    ctx: Arc<SchedulerContext>,
    interval_secs: u64,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs, "cron loop started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("cron loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    let scanner = Scanner::new(ctx.clone());
                    let params = ScanParams::from_context(&ctx, SweepTrigger::Cron);
                    if let Err(e) = scanner.run_sweep(&params).await {
                        error!(error = %e, "cron sweep failed");
                    }
                    if let Err(e) = worker::run_cron_scan(&ctx).await {
                        error!(error = %e, "cron scan failed");
                    }
                }
            }
        }
    })
}

/// Installs handlers for SIGTERM and SIGINT (Ctrl+C).
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
