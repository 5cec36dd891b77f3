//! PBX call-control clients.
//!
//! The PBX exists in two API generations that share nothing on the wire:
//!
//! - **Legacy**: session cookie from `/api/login`, group membership through
//!   the paginated edit API, calls from `/api/activeCalls`.
//! - **Modern**: bearer token from `/connect/token`, calls from `/callcontrol`.
//!
//! Both implement [`PbxApi`]. [`connect`] picks the generation once at
//! startup: the modern login is tried first and an HTTP 404 from it means
//! the modern API is absent, so the legacy client is used instead. Any other
//! modern login failure is fatal.

pub mod legacy;
pub mod modern;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::PbxConfig;
use crate::domain::{CallSnapshot, ExtensionSet};

pub use legacy::LegacyClient;
pub use modern::ModernClient;

/// Seconds between two login attempts while the PBX is unreachable
pub const RETRY_INTERVAL_SECS: u64 = 5;

/// PBX API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    Legacy,
    Modern,
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Modern => f.write_str("modern"),
        }
    }
}

/// Errors talking to the PBX
#[derive(Debug, Error)]
pub enum PbxError {
    #[error("Unable to reach the PBX while {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response while {context} (HTTP {status}): {body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unable to parse PBX response while {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("PBX login rejected: {0}")]
    Rejected(String),

    #[error("Not authenticated to the PBX")]
    NotAuthenticated,

    #[error("Group not found on the PBX: {0:?}")]
    GroupNotFound(String),

    #[error("Unable to authenticate to the {generation} PBX API for {offline_for:?}: {source}")]
    OfflineTooLong {
        generation: ApiGeneration,
        offline_for: Duration,
        #[source]
        source: Box<PbxError>,
    },
}

impl PbxError {
    /// HTTP status of the failed request, if the PBX answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The endpoint does not exist (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The session or token is no longer accepted (HTTP 401/403)
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::NotAuthenticated) || matches!(self.status(), Some(401) | Some(403))
    }
}

/// How long and how often to retry a failing login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts
    pub interval: Duration,

    /// Give up once the PBX has been unreachable for longer than this
    pub max_offline: Duration,

    /// Stop at the first HTTP 404 instead of retrying. Only the generation
    /// probe sets this.
    pub give_up_on_not_found: bool,
}

impl RetryPolicy {
    pub fn new(max_offline: Duration) -> Self {
        Self {
            interval: Duration::from_secs(RETRY_INTERVAL_SECS),
            max_offline,
            give_up_on_not_found: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Same policy, but an HTTP 404 ends the retries immediately
    pub fn probing(mut self) -> Self {
        self.give_up_on_not_found = true;
        self
    }
}

/// Capabilities shared by both PBX API generations
#[async_trait]
pub trait PbxApi: Send + Sync {
    fn generation(&self) -> ApiGeneration;

    /// Log in once and refresh the monitored extensions.
    async fn authenticate(&mut self) -> Result<(), PbxError>;

    /// Calls currently active on the PBX
    async fn fetch_active_calls(&self) -> Result<Vec<CallSnapshot>, PbxError>;

    /// Extensions of the monitored group, as of the last login
    fn extensions(&self) -> &ExtensionSet;

    fn is_monitored_extension(&self, number: &str) -> bool {
        self.extensions().contains(number)
    }

    /// Log in, retrying every `policy.interval` until the PBX has been
    /// unreachable for longer than `policy.max_offline`.
    async fn authenticate_with_retry(&mut self, policy: &RetryPolicy) -> Result<(), PbxError> {
        let mut down_since: Option<Instant> = None;

        loop {
            let err = match self.authenticate().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if policy.give_up_on_not_found && err.is_not_found() {
                return Err(err);
            }

            let offline_for = down_since.get_or_insert_with(Instant::now).elapsed();
            if offline_for > policy.max_offline {
                return Err(PbxError::OfflineTooLong {
                    generation: self.generation(),
                    offline_for,
                    source: Box::new(err),
                });
            }

            warn!(
                generation = %self.generation(),
                error = %err,
                "Unable to authenticate to the PBX - retrying in {:?}",
                policy.interval
            );
            tokio::time::sleep(policy.interval).await;
        }
    }
}

/// The client picked at startup
pub enum PbxClient {
    Legacy(LegacyClient),
    Modern(ModernClient),
}

#[async_trait]
impl PbxApi for PbxClient {
    fn generation(&self) -> ApiGeneration {
        match self {
            Self::Legacy(client) => client.generation(),
            Self::Modern(client) => client.generation(),
        }
    }

    async fn authenticate(&mut self) -> Result<(), PbxError> {
        match self {
            Self::Legacy(client) => client.authenticate().await,
            Self::Modern(client) => client.authenticate().await,
        }
    }

    async fn fetch_active_calls(&self) -> Result<Vec<CallSnapshot>, PbxError> {
        match self {
            Self::Legacy(client) => client.fetch_active_calls().await,
            Self::Modern(client) => client.fetch_active_calls().await,
        }
    }

    fn extensions(&self) -> &ExtensionSet {
        match self {
            Self::Legacy(client) => client.extensions(),
            Self::Modern(client) => client.extensions(),
        }
    }
}

/// Detect the PBX API generation and return an authenticated client.
pub async fn connect(config: &PbxConfig, policy: &RetryPolicy) -> Result<PbxClient, PbxError> {
    let mut modern = ModernClient::new(config)?;

    match modern.authenticate_with_retry(&policy.probing()).await {
        Ok(()) => {
            info!(host = %config.host, "Connected to the modern PBX API");
            Ok(PbxClient::Modern(modern))
        }
        Err(err) if err.is_not_found() => {
            info!(host = %config.host, "Modern PBX API not found, falling back to the legacy API");
            let mut legacy = LegacyClient::new(config)?;
            legacy.authenticate_with_retry(policy).await?;
            info!(
                host = %config.host,
                extensions = legacy.extensions().len(),
                "Connected to the legacy PBX API"
            );
            Ok(PbxClient::Legacy(legacy))
        }
        Err(err) => Err(err),
    }
}

/// Build the reqwest client shared by the request helpers
pub(crate) fn http_client(cookie_store: bool) -> Result<reqwest::Client, PbxError> {
    reqwest::Client::builder()
        .cookie_store(cookie_store)
        .timeout(Duration::from_secs(super::REQUEST_TIMEOUT))
        .build()
        .map_err(|source| PbxError::Transport {
            context: "building the HTTP client",
            source,
        })
}

/// Send a request and return the body of a successful (< 300) response
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    context: &'static str,
) -> Result<String, PbxError> {
    let response = request
        .send()
        .await
        .map_err(|source| PbxError::Transport { context, source })?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|source| PbxError::Transport { context, source })?;

    if status >= 300 {
        return Err(PbxError::Status {
            context,
            status,
            body,
        });
    }

    Ok(body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str, context: &'static str) -> Result<T, PbxError> {
    serde_json::from_str(body).map_err(|source| PbxError::Decode { context, source })
}
