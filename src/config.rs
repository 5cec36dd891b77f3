//! Configuration for callbridge.
//!
//! Configuration sources (highest priority first):
//! 1. Explicit path (`--config` or the CALLBRIDGE_CONFIG environment variable)
//! 2. The first readable and parseable file in [`DEFAULT_CONFIG_PATHS`]
//!
//! The YAML layout keeps the section names of existing deployments
//! (`Bridge`, `3CX`, `Zammad`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::adapters::RetryPolicy;
use crate::core::{BridgeSettings, CallClassifier, DigitRules, PhoneNormalizer};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CALLBRIDGE_CONFIG";

/// Files tried in order when no explicit path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "config.yaml",
    "/etc/callbridge/config.yaml",
    "/opt/callbridge/config.yaml",
];

const REDACTED: &str = "***";

/// Config file schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Bridge", default)]
    pub bridge: BridgeConfig,

    #[serde(rename = "3CX")]
    pub pbx: PbxConfig,

    #[serde(rename = "Zammad")]
    pub ticketing: TicketingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Seconds between two polls (fractional)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,

    /// Seconds the PBX may stay unreachable before the bridge gives up
    #[serde(default = "default_max_offline")]
    pub max_offline: f64,
}

fn default_poll_interval() -> f64 {
    0.5
}

fn default_max_offline() -> f64 {
    120.0
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_offline: default_max_offline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PbxConfig {
    /// Base URL, e.g. https://pbx.example.com
    pub host: String,

    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,

    /// Modern API client credentials; used instead of user/pass when both are set
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,

    /// Name of the monitored group
    #[serde(default)]
    pub group: String,

    pub extension_digits: usize,
    pub trunk_digits: usize,

    /// Agent number reported for missed queue calls
    #[serde(default, deserialize_with = "number_or_string")]
    pub queue_extension: String,

    /// Country calling code without `+`, e.g. "49"
    #[serde(default, deserialize_with = "optional_number_or_string")]
    pub country_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketingConfig {
    /// Webhook URL receiving the call events
    pub endpoint: String,

    #[serde(default)]
    pub log_missed_queue_calls: bool,
}

/// Existing files write some identifiers as YAML numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

impl From<NumberOrString> for String {
    fn from(value: NumberOrString) -> Self {
        match value {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s,
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(NumberOrString::deserialize(deserializer)?.into())
}

fn optional_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<NumberOrString>::deserialize(deserializer)?
        .map(String::from)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

impl Config {
    /// Parse, clean up and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml).context("Failed to parse config")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load the config from `explicit` or from the default locations.
    /// Returns the config and the file it came from.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit {
            let mut config = load_config_file(path)?;
            config.normalize();
            config
                .validate()
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            return Ok((config, path.to_path_buf()));
        }

        Self::search(DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from))
    }

    /// Use the first candidate that can be read and parsed. Unreadable files
    /// are skipped quietly, unparseable ones with a warning.
    pub fn search<I>(candidates: I) -> Result<(Self, PathBuf)>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in candidates {
            if !path.is_file() {
                debug!(path = %path.display(), "No config file here");
                continue;
            }

            match load_config_file(&path) {
                Ok(mut config) => {
                    config.normalize();
                    config
                        .validate()
                        .with_context(|| format!("Invalid config file: {}", path.display()))?;
                    return Ok((config, path));
                }
                Err(e) => {
                    warn!(path = %path.display(), "Skipping config file: {:#}", e);
                }
            }
        }

        bail!("Unable to find a config file (set --config or {})", CONFIG_ENV)
    }

    fn normalize(&mut self) {
        self.pbx.host = self.pbx.host.trim().trim_end_matches('/').to_string();
        self.ticketing.endpoint = self.ticketing.endpoint.trim().to_string();
    }

    /// Check everything the bridge relies on at startup
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.pbx.host) {
            bail!(
                "3CX host needs to be a full URL with protocol, e.g. https://pbx.example.com (got {:?})",
                self.pbx.host
            );
        }
        if !is_http_url(&self.ticketing.endpoint) {
            bail!(
                "Zammad endpoint needs to be a full URL with protocol (got {:?})",
                self.ticketing.endpoint
            );
        }

        let interval = self.bridge.poll_interval;
        if interval <= 0.0 || Duration::try_from_secs_f64(interval).is_err() {
            bail!("poll_interval must be a positive number of seconds (got {})", interval);
        }
        let max_offline = self.bridge.max_offline;
        if Duration::try_from_secs_f64(max_offline).is_err() {
            bail!("max_offline must be zero or more seconds (got {})", max_offline);
        }

        if self.pbx.extension_digits == 0 || self.pbx.trunk_digits == 0 {
            bail!("extension_digits and trunk_digits must be greater than zero");
        }

        let has_login = !self.pbx.user.is_empty() && !self.pbx.pass.is_empty();
        let has_client = !self.pbx.client_id.is_empty() && !self.pbx.client_secret.is_empty();
        if !has_login && !has_client {
            bail!("3CX credentials missing: set user/pass or client_id/client_secret");
        }

        if let Some(prefix) = &self.pbx.country_prefix {
            if !prefix.chars().all(|c| c.is_ascii_digit()) || prefix.starts_with('0') {
                bail!(
                    "country_prefix must be the calling code digits without a leading 0 or + (got {:?})",
                    prefix
                );
            }
        }

        Ok(())
    }

    /// Only valid after [`Config::validate`] passed
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.bridge.poll_interval)
    }

    pub fn max_offline(&self) -> Duration {
        Duration::from_secs_f64(self.bridge.max_offline)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_offline())
    }

    pub fn settings(&self) -> BridgeSettings {
        BridgeSettings {
            poll_interval: self.poll_interval(),
            retry: self.retry_policy(),
            queue_extension: self.pbx.queue_extension.clone(),
            log_missed_queue_calls: self.ticketing.log_missed_queue_calls,
        }
    }

    pub fn classifier(&self) -> CallClassifier {
        CallClassifier::new(
            DigitRules {
                extension_digits: self.pbx.extension_digits,
                trunk_digits: self.pbx.trunk_digits,
            },
            PhoneNormalizer::new(self.pbx.country_prefix.as_deref()),
        )
    }

    /// Copy with secrets masked, safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [&mut copy.pbx.pass, &mut copy.pbx.client_secret] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
