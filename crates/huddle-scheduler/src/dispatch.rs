// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The assistant dispatcher boundary.
//!
//! The contract is at-least-once notification: the dispatcher learns that
//! a ticket has pending unanswered messages and re-reads them itself. No
//! message content crosses this boundary.

use std::time::Duration;

use async_trait::async_trait;
use huddle_core::HuddleError;
use tracing::{debug, info};

/// External collaborator notified once per won fire-claim.
#[async_trait]
pub trait AssistantDispatcher: Send + Sync {
    /// Notify the assistant that `ticket_id` has pending messages.
    async fn dispatch(&self, ticket_id: &str) -> Result<(), HuddleError>;
}

/// Production dispatcher: POSTs `{"ticketId": ...}` to a webhook endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatcher {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, HuddleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuddleError::Dispatch {
                message: format!("failed to build dispatch client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl AssistantDispatcher for HttpDispatcher {
    async fn dispatch(&self, ticket_id: &str) -> Result<(), HuddleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "ticketId": ticket_id }))
            .send()
            .await
            .map_err(|e| HuddleError::Dispatch {
                message: format!("dispatch endpoint unreachable: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HuddleError::Dispatch {
                message: format!("dispatch endpoint returned {status}"),
                source: None,
            });
        }

        debug!(ticket_id, "assistant notified");
        Ok(())
    }
}

/// Dry-run dispatcher used when no endpoint is configured. Fires are
/// logged and counted but go nowhere.
pub struct NoopDispatcher;

#[async_trait]
impl AssistantDispatcher for NoopDispatcher {
    async fn dispatch(&self, ticket_id: &str) -> Result<(), HuddleError> {
        info!(ticket_id, "dry-run dispatch (no endpoint configured)");
        Ok(())
    }
}
