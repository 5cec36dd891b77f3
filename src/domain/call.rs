//! Call types: what the PBX reports per poll and what the bridge remembers.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status tag of an active call as reported by the PBX.
///
/// Only `Routing`, `Talking` and `Transferring` carry meaning for the bridge.
/// Everything else is kept verbatim so it can be logged, but it never
/// produces an answer or hangup event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallStatus {
    /// Ringing at one or more extensions, not yet picked up
    Routing,

    /// Connected to an agent
    Talking,

    /// Being transferred, typically waiting in a queue
    Transferring,

    /// Any other PBX-specific tag
    Other(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Routing => "Routing",
            Self::Talking => "Talking",
            Self::Transferring => "Transferring",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for CallStatus {
    fn from(tag: &str) -> Self {
        match tag {
            "Routing" => Self::Routing,
            "Talking" => Self::Talking,
            "Transferring" => Self::Transferring,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for CallStatus {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "Routing" | "Talking" | "Transferring" => Self::from(tag.as_str()),
            _ => Self::Other(tag),
        }
    }
}

impl From<CallStatus> for String {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a bridged call, seen from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Short form used by the ticketing webhook (`in` / `out`)
    pub fn as_webhook(&self) -> &'static str {
        match self {
            Self::Inbound => "in",
            Self::Outbound => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("Inbound"),
            Self::Outbound => f.write_str("Outbound"),
        }
    }
}

/// One call as reported by a single poll of the PBX.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    /// PBX call identifier, unique while the call is ongoing
    pub id: String,

    pub caller_number: String,
    pub caller_name: String,
    pub callee_number: String,
    pub callee_name: String,

    pub status: CallStatus,
}

impl CallSnapshot {
    /// Build a snapshot from the `"<number> <display name>"` text the legacy
    /// API reports for each party.
    pub fn from_party_text(
        id: impl Into<String>,
        caller: &str,
        callee: &str,
        status: impl Into<CallStatus>,
    ) -> Self {
        let (caller_number, caller_name) = split_party(caller);
        let (callee_number, callee_name) = split_party(callee);
        Self {
            id: id.into(),
            caller_number,
            caller_name,
            callee_number,
            callee_name,
            status: status.into(),
        }
    }

    /// Caller number and display name joined the way the PBX shows them
    pub fn caller_text(&self) -> String {
        join_party(&self.caller_number, &self.caller_name)
    }

    /// Callee number and display name joined the way the PBX shows them
    pub fn callee_text(&self) -> String {
        join_party(&self.callee_number, &self.callee_name)
    }
}

fn split_party(text: &str) -> (String, String) {
    match text.split_once(' ') {
        Some((number, name)) => (number.to_string(), name.to_string()),
        None => (text.to_string(), String::new()),
    }
}

fn join_party(number: &str, name: &str) -> String {
    if name.is_empty() {
        number.to_string()
    } else {
        format!("{} {}", number, name)
    }
}

/// Agent and external party resolved from a classified snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParties {
    pub agent_number: String,
    pub agent_name: String,
    /// External number, already normalized
    pub external_number: String,
}

/// The bridge's view of an ongoing call, kept across poll cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// PBX call identifier (store key)
    pub id: String,

    /// Correlation identifier sent to the ticketing system
    pub uid: Uuid,

    pub direction: Direction,
    pub agent_number: String,
    pub agent_name: String,
    pub external_number: String,

    /// Last status observed
    pub status: CallStatus,

    /// When the bridge first saw the call
    pub first_seen: DateTime<Utc>,

    /// A `newCall` event has been sent (never reset)
    pub notified_new: bool,

    /// An `answer` event has been sent (never reset)
    pub notified_answered: bool,
}

impl CallRecord {
    /// Create a record for a call seen for the first time
    pub fn new(id: impl Into<String>, direction: Direction, parties: CallParties, status: CallStatus) -> Self {
        Self {
            id: id.into(),
            uid: Uuid::new_v4(),
            direction,
            agent_number: parties.agent_number,
            agent_name: parties.agent_name,
            external_number: parties.external_number,
            status,
            first_seen: Utc::now(),
            notified_new: false,
            notified_answered: false,
        }
    }

    /// Fold a fresh observation into this record.
    ///
    /// The correlation id, first-seen time and notification flags survive.
    pub fn observe(&mut self, direction: Direction, parties: CallParties, status: CallStatus) {
        self.direction = direction;
        self.agent_number = parties.agent_number;
        self.agent_name = parties.agent_name;
        self.external_number = parties.external_number;
        self.status = status;
    }

    /// `(from, to)` as the ticketing system expects them
    pub fn endpoints(&self) -> (&str, &str) {
        match self.direction {
            Direction::Inbound => (&self.external_number, &self.agent_number),
            Direction::Outbound => (&self.agent_number, &self.external_number),
        }
    }
}

/// Extensions of the monitored group. Replaced wholesale on every login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    numbers: HashSet<String>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, number: &str) -> bool {
        self.numbers.contains(number)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Sorted copy, for logs and diagnostics
    pub fn sorted(&self) -> Vec<&str> {
        let mut numbers: Vec<&str> = self.numbers.iter().map(String::as_str).collect();
        numbers.sort_unstable();
        numbers
    }
}

impl<S: Into<String>> FromIterator<S> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            numbers: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for ExtensionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.numbers.extend(iter.into_iter().map(Into::into));
    }
}
