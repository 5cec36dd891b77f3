//! Call reconciliation logic.
//!
//! This module contains:
//! - Normalizer: external numbers to national format
//! - Classifier: call direction and parties
//! - Store: calls currently tracked
//! - Notifier: flag-guarded event delivery
//! - Reconciler: the poll loop

pub mod classifier;
pub mod normalizer;
pub mod notifier;
pub mod reconciler;
pub mod store;

// Re-export commonly used types
pub use classifier::{CallClassifier, DigitRules};
pub use normalizer::PhoneNormalizer;
pub use notifier::Notifier;
pub use reconciler::{BridgeSettings, CycleOutcome, CycleReport, Reconciler};
pub use store::CallStore;
