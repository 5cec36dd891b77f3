//! callbridge - PBX to helpdesk call bridge
//!
//! Polls a PBX for its active calls, keeps the calls of one monitored group
//! in memory and reports their lifecycle (`newCall`, `answer`, `hangup`) to a
//! ticketing webhook.
//!
//! # Modules
//!
//! - `adapters`: PBX clients (legacy and modern API) and the ticketing webhook
//! - `core`: Normalizer, classifier, call store, notifier and the poll loop
//! - `domain`: Data structures (CallSnapshot, CallRecord, events)
//! - `config`: YAML configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Bridge calls using ./config.yaml
//! callbridge
//!
//! # Show how the current calls are classified
//! callbridge --config /etc/callbridge/config.yaml calls
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{connect, EventSink, PbxApi, PbxClient, PbxError, RetryPolicy, TicketingWebhook, WebhookPayload};
pub use config::Config;
pub use crate::core::{CallClassifier, PhoneNormalizer, Reconciler};
pub use domain::{CallRecord, CallSnapshot, CallStatus, Direction, EventKind, HangupCause};
