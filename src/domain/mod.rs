//! Domain types for the call bridge.
//!
//! This module contains the core data structures:
//! - Call: snapshots reported by the PBX and the records derived from them
//! - Events: lifecycle events forwarded to the ticketing system

pub mod call;
pub mod events;

// Re-export commonly used types
pub use call::{CallParties, CallRecord, CallSnapshot, CallStatus, Direction, ExtensionSet};
pub use events::{EventKind, HangupCause};
