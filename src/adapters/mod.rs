//! Adapters for the external systems.
//!
//! - `pbx`: the PBX call-control API (legacy and modern generations)
//! - `ticketing`: the helpdesk webhook receiving lifecycle events

pub mod pbx;
pub mod ticketing;

/// Per-request timeout for every HTTP client, in seconds
pub const REQUEST_TIMEOUT: u64 = 30;

pub use pbx::{connect, ApiGeneration, PbxApi, PbxClient, PbxError, RetryPolicy};
pub use ticketing::{EventSink, NotifyError, TicketingWebhook, WebhookPayload};
