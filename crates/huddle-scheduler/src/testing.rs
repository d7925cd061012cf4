// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for scheduler unit tests: mock dispatchers, temp
//! databases, and fast-timing configs.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_config::model::{RecoveryConfig, SchedulerConfig};
use huddle_core::HuddleError;
use huddle_storage::{Database, Ticket, now_rfc3339, queries};
use tempfile::TempDir;

use crate::SchedulerContext;
use crate::dispatch::AssistantDispatcher;

/// Records every dispatch with its instant, for trailing-edge assertions.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantDispatcher for RecordingDispatcher {
    async fn dispatch(&self, ticket_id: &str) -> Result<(), HuddleError> {
        self.calls
            .lock()
            .unwrap()
            .push((ticket_id.to_string(), Utc::now()));
        Ok(())
    }
}

/// Fails the first `failures` dispatches, then succeeds. `failures` of
/// `usize::MAX` fails forever.
pub struct FlakyDispatcher {
    failures_remaining: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakyDispatcher {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AssistantDispatcher for FlakyDispatcher {
    async fn dispatch(&self, _ticket_id: &str) -> Result<(), HuddleError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(HuddleError::Dispatch {
                message: "injected failure".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

/// Open a fresh migrated database in a temp dir.
pub async fn test_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("scheduler_test.db");
    let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

/// Scheduler config with sub-second timings so tests stay fast.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        debounce_window_secs: 1,
        sweep_limit: 25,
        cron_scan_limit: 10,
        poll_interval_ms: 25,
        max_wait_secs: 5,
        retry_delay_secs: 0,
        max_dispatch_attempts: 3,
        sweep_interval_secs: 60,
    }
}

pub fn context(
    db: Database,
    dispatcher: Arc<dyn AssistantDispatcher>,
    scheduler: SchedulerConfig,
) -> Arc<SchedulerContext> {
    SchedulerContext::new(db, dispatcher, scheduler, RecoveryConfig::default())
}

/// Seed a ticket the scanner can resolve batches against.
pub async fn seed_ticket(db: &Database, id: &str, chat_key: &str, client_id: &str) {
    queries::tickets::insert(
        db,
        &Ticket {
            id: id.to_string(),
            chat_key: chat_key.to_string(),
            client_id: client_id.to_string(),
            instance_id: "inst-1".to_string(),
            created_at: now_rfc3339(),
        },
    )
    .await
    .unwrap();
}

/// Append one inbound message, returning the batch id.
pub async fn seed_message(db: &Database, chat_id: &str, client_id: &str, body: &str) -> String {
    queries::batches::append_message(
        db,
        chat_id,
        client_id,
        "inst-1",
        &huddle_storage::RawMessage {
            id: uuid::Uuid::new_v4().to_string(),
            body: body.to_string(),
            received_at: now_rfc3339(),
        },
    )
    .await
    .unwrap()
}
