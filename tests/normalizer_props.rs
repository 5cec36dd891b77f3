//! Property tests for number normalization and call classification

use callbridge::core::{CallClassifier, DigitRules, PhoneNormalizer};
use callbridge::domain::{CallSnapshot, Direction, ExtensionSet};
use proptest::prelude::*;

fn party_text() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9+() a-zA-Z]{0,24}").unwrap()
}

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in party_text(), prefix in "[1-9][0-9]{0,2}") {
        let normalizer = PhoneNormalizer::new(Some(prefix.as_str()));
        let once = normalizer.normalize(&raw);
        prop_assert_eq!(normalizer.normalize(&once), once);
    }

    #[test]
    fn normalize_without_prefix_only_unwraps_brackets(number in "[0-9]{4,12}") {
        let normalizer = PhoneNormalizer::new(None);
        prop_assert_eq!(normalizer.normalize(&number), number.clone());
        let bracketed = format!("x ({})", number);
        prop_assert_eq!(normalizer.normalize(&bracketed), number);
    }

    #[test]
    fn classification_is_total_and_consistent(
        caller in "[0-9]{1,12}",
        callee in "[0-9]{1,12}",
        status in "(Routing|Talking|Transferring|Held)",
    ) {
        let extensions: ExtensionSet = ["150", "151", "152"].into_iter().collect();
        let classifier = CallClassifier::new(
            DigitRules { extension_digits: 3, trunk_digits: 10 },
            PhoneNormalizer::new(Some("49")),
        );
        let snapshot = CallSnapshot::from_party_text("1", &caller, &callee, status.as_str());

        match classifier.classify(&snapshot, |n| extensions.contains(n)) {
            Some((Direction::Outbound, parties)) => {
                prop_assert!(extensions.contains(&caller));
                prop_assert_eq!(callee.len(), 10);
                prop_assert_eq!(parties.agent_number, caller);
            }
            Some((Direction::Inbound, parties)) => {
                prop_assert!(extensions.contains(&callee));
                prop_assert_eq!(caller.len(), 10);
                prop_assert_eq!(parties.agent_number, callee);
            }
            None => {
                let outbound = extensions.contains(&caller) && callee.len() == 10;
                let inbound = extensions.contains(&callee) && caller.len() == 10;
                prop_assert!(!outbound && !inbound);
            }
        }
    }
}
