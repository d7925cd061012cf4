// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP admin trigger surface for the Huddle dispatch scheduler.
//!
//! One endpoint drives everything: `POST /v1/dispatch` processes a single
//! ticket, runs a cron scan, runs a parameterized sweep, or invokes the
//! recovery/health actions, depending on the request body shape. Health
//! and Prometheus metrics are served unauthenticated.

pub mod handlers;
pub mod server;

pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
