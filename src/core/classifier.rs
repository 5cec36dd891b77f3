//! Call direction classification.
//!
//! A call is bridged only when exactly one side is a monitored extension and
//! the other side looks like an external trunk number. Everything else
//! (internal calls, calls of unmonitored extensions, numbers with unexpected
//! lengths) is ignored.

use serde::{Deserialize, Serialize};

use crate::domain::{CallParties, CallSnapshot, Direction};

use super::normalizer::PhoneNormalizer;

/// Digit counts that tell extensions and trunk numbers apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitRules {
    /// Length of an internal extension number (e.g. 3 for `150`)
    pub extension_digits: usize,

    /// Length of an external number as the PBX reports it
    pub trunk_digits: usize,
}

/// Classifies snapshots and resolves agent/external parties.
#[derive(Debug, Clone)]
pub struct CallClassifier {
    rules: DigitRules,
    normalizer: PhoneNormalizer,
}

impl CallClassifier {
    pub fn new(rules: DigitRules, normalizer: PhoneNormalizer) -> Self {
        Self { rules, normalizer }
    }

    pub fn rules(&self) -> DigitRules {
        self.rules
    }

    /// Direction of the call, or `None` when it is not bridged.
    pub fn direction<F>(&self, snapshot: &CallSnapshot, is_extension: F) -> Option<Direction>
    where
        F: Fn(&str) -> bool,
    {
        let caller_len = snapshot.caller_number.chars().count();
        let callee_len = snapshot.callee_number.chars().count();

        if caller_len == self.rules.extension_digits
            && callee_len == self.rules.trunk_digits
            && is_extension(&snapshot.caller_number)
        {
            Some(Direction::Outbound)
        } else if caller_len == self.rules.trunk_digits
            && callee_len == self.rules.extension_digits
            && is_extension(&snapshot.callee_number)
        {
            Some(Direction::Inbound)
        } else {
            None
        }
    }

    /// Agent and normalized external party for a classified call
    pub fn parties(&self, snapshot: &CallSnapshot, direction: Direction) -> CallParties {
        match direction {
            Direction::Outbound => CallParties {
                agent_number: snapshot.caller_number.clone(),
                agent_name: snapshot.caller_name.clone(),
                external_number: self.normalizer.normalize(&snapshot.callee_text()),
            },
            Direction::Inbound => CallParties {
                agent_number: snapshot.callee_number.clone(),
                agent_name: snapshot.callee_name.clone(),
                external_number: self.normalizer.normalize(&snapshot.caller_text()),
            },
        }
    }

    /// Direction and parties in one go; `None` means ignored
    pub fn classify<F>(&self, snapshot: &CallSnapshot, is_extension: F) -> Option<(Direction, CallParties)>
    where
        F: Fn(&str) -> bool,
    {
        let direction = self.direction(snapshot, is_extension)?;
        Some((direction, self.parties(snapshot, direction)))
    }
}
