//! Ticketing system webhook client.
//!
//! Endpoint: POST <configured URL>
//! Body: JSON, one lifecycle event per request. Any status >= 300 is a
//! delivery failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::{CallRecord, Direction, EventKind, HangupCause};

use super::REQUEST_TIMEOUT;

/// Errors that can occur while delivering an event
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Unable to reach the ticketing webhook: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from the ticketing webhook (HTTP {status}): {body}")]
    Status { status: u16, body: String },
}

/// Payload posted to the ticketing webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: EventKind,
    pub from: String,
    pub to: String,

    /// `in` or `out`
    pub direction: String,

    pub call_id: String,

    /// Same as `call_id`; older ticketing versions read this name
    pub callid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<HangupCause>,

    #[serde(
        rename = "answeringNumber",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub answering_number: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
}

impl WebhookPayload {
    fn for_record(event: EventKind, record: &CallRecord) -> Self {
        let (from, to) = record.endpoints();
        let call_id = record.uid.to_string();
        Self {
            event,
            from: from.to_string(),
            to: to.to_string(),
            direction: record.direction.as_webhook().to_string(),
            callid: call_id.clone(),
            call_id,
            cause: None,
            answering_number: record.agent_number.clone(),
            user: String::new(),
        }
    }

    /// `newCall`: carries the agent's display name
    pub fn new_call(record: &CallRecord) -> Self {
        Self {
            user: record.agent_name.clone(),
            ..Self::for_record(EventKind::NewCall, record)
        }
    }

    /// `answer`: the agent's display name is only sent for inbound calls
    pub fn answer(record: &CallRecord) -> Self {
        let user = match record.direction {
            Direction::Inbound => record.agent_name.clone(),
            Direction::Outbound => String::new(),
        };
        Self {
            user,
            ..Self::for_record(EventKind::Answer, record)
        }
    }

    pub fn hangup(record: &CallRecord, cause: HangupCause) -> Self {
        Self {
            cause: Some(cause),
            ..Self::for_record(EventKind::Hangup, record)
        }
    }
}

/// Destination for lifecycle events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Human-readable sink name
    fn name(&self) -> &str;

    /// Deliver one event
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotifyError>;
}

/// HTTP client for the ticketing webhook
pub struct TicketingWebhook {
    endpoint: String,
    client: reqwest::Client,
}

impl TicketingWebhook {
    /// Create a client posting to `endpoint`
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        // Redirects count as delivery failures
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for TicketingWebhook {
    fn name(&self) -> &str {
        "ticketing-webhook"
    }

    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        trace!(
            call_id = %payload.call_id,
            event = %payload.event,
            from = %payload.from,
            to = %payload.to,
            "Ticketing request (POST)"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(call_id = %payload.call_id, event = %payload.event, status, "Ticketing response");

        if status >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        Ok(())
    }
}
