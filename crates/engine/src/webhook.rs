//! Best-effort status webhook, notifying an external URL after every
//! workflow-level status transition.
//!
//! A fire-and-forget POST; failures are logged and never propagated —
//! the engine's correctness never depends on the webhook landing.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::WorkflowStatus;

#[derive(Serialize)]
struct StatusUpdate {
    dispatch_id: Uuid,
    status: String,
}

#[derive(Clone)]
pub struct WebhookClient {
    url: String,
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }

    pub async fn notify(&self, dispatch_id: Uuid, status: WorkflowStatus) {
        let body = StatusUpdate { dispatch_id, status: status.to_string() };
        if let Err(err) = self.client.post(&self.url).json(&body).send().await {
            warn!(%dispatch_id, %err, "status webhook notification failed");
        }
    }
}
