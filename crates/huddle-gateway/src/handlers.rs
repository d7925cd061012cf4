// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the admin trigger surface.
//!
//! `POST /v1/dispatch` accepts the four body shapes of the external
//! contract (camelCase): a single ticket, a cron scan, sweep parameters,
//! or a named admin action. `GET /health` and `GET /metrics` are public.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use huddle_core::SweepTrigger;
use huddle_scheduler::{Recovery, ScanParams, Scanner, worker};

use crate::server::GatewayState;

/// Request body for POST /v1/dispatch.
///
/// Untagged: the first matching shape wins, so the specific shapes come
/// before the all-optional sweep parameters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DispatchRequest {
    /// `{"action": "monitor" | "recovery" | "force-batch-processing"}`
    Action { action: AdminAction },
    /// `{"ticketId": "..."}` -- process one ticket immediately.
    Ticket {
        #[serde(rename = "ticketId")]
        ticket_id: String,
    },
    /// `{"cronScan": true}` -- bulk-sweep due debounce windows.
    CronScan {
        #[serde(rename = "cronScan")]
        cron_scan: bool,
    },
    /// Scanner sweep parameters; `{}` means a default sweep.
    Sweep(SweepRequest),
}

/// Recovery/health surface actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminAction {
    Monitor,
    Recovery,
    ForceBatchProcessing,
}

/// Optional sweep parameters, defaulted from config where absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SweepRequest {
    pub limit: Option<i64>,
    pub debounce_window_sec: Option<i64>,
    pub only_orphaned: Option<bool>,
    pub trigger: Option<SweepTrigger>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// POST /v1/dispatch
pub async fn post_dispatch(
    State(state): State<GatewayState>,
    Json(body): Json<DispatchRequest>,
) -> Response {
    let result = match body {
        DispatchRequest::Ticket { ticket_id } => {
            worker::process_ticket(&state.ctx, &ticket_id)
                .await
                .map(|outcome| {
                    serde_json::json!({ "ticketId": ticket_id, "result": outcome })
                })
        }
        DispatchRequest::CronScan { cron_scan } => {
            if cron_scan {
                worker::run_cron_scan(&state.ctx)
                    .await
                    .map(|report| serde_json::json!({ "cronScan": report }))
            } else {
                Ok(serde_json::json!({ "cronScan": worker::CronScanReport::default() }))
            }
        }
        DispatchRequest::Action { action } => {
            let recovery = Recovery::new(state.ctx.clone());
            match action {
                AdminAction::Monitor => recovery
                    .monitor()
                    .await
                    .map(|health| serde_json::json!({ "health": health })),
                AdminAction::Recovery => recovery
                    .run_recovery()
                    .await
                    .map(|report| serde_json::json!({ "recovery": report })),
                AdminAction::ForceBatchProcessing => recovery
                    .force_sweep()
                    .await
                    .map(|report| serde_json::json!({ "sweep": report })),
            }
        }
        DispatchRequest::Sweep(params) => {
            let trigger = params.trigger.unwrap_or(SweepTrigger::Manual);
            let mut scan = ScanParams::from_context(&state.ctx, trigger);
            if let Some(limit) = params.limit {
                scan.limit = limit;
            }
            if let Some(window) = params.debounce_window_sec {
                scan.debounce_window_secs = window;
            }
            scan.only_orphaned = params.only_orphaned.unwrap_or(false);
            Scanner::new(state.ctx.clone())
                .run_sweep(&scan)
                .await
                .map(|report| serde_json::json!({ "sweep": report }))
        }
    };

    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            error!(error = %e, "dispatch request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text format when a recorder is installed, empty otherwise.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (StatusCode::OK, render()).into_response(),
        None => (StatusCode::OK, String::new()).into_response(),
    }
}
