//! Lifecycle events forwarded to the ticketing system.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// The call was seen for the first time
    NewCall,

    /// An agent picked up
    Answer,

    /// The call disappeared from the PBX
    Hangup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewCall => "newCall",
            Self::Answer => "answer",
            Self::Hangup => "hangup",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a `hangup` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HangupCause {
    /// Ended before anyone answered
    Cancel,

    /// Ended after being connected
    NormalClearing,
}

impl HangupCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::NormalClearing => "normalClearing",
        }
    }
}

impl fmt::Display for HangupCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
