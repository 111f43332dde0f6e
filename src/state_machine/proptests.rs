//! Property-based tests for awaiting-response transitions
//!
//! Replays random topic sequences through the store the way the router
//! does and checks membership against an independently computed model.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_topic() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => Just(RANDOM_TOPIC.to_string()),
        1 => Just("sad".to_string()),
        1 => Just("happy".to_string()),
        1 => "[a-z]{3,8}".prop_map(String::from),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    /// A routing pass ending with the given topic, with an optional `wait`
    Reply {
        topic: String,
        manual: Option<bool>,
    },
}

fn arb_step() -> impl Strategy<Value = Step> {
    (
        arb_topic(),
        prop_oneof![4 => Just(None), 1 => any::<bool>().prop_map(Some)],
    )
        .prop_map(|(topic, manual)| Step::Reply { topic, manual })
}

/// Run one routing pass against the store, as the router does
fn run_pass(store: &mut ConversationStore, thread: &str, topic: &str, manual: Option<bool>) {
    let previous = store.topic(thread);
    if let Some(flag) = manual {
        store.set_awaiting(thread, flag);
    }
    store.set_topic(thread, topic);
    if let Some(awaiting) = awaiting_transition(&previous, topic, manual).membership() {
        store.set_awaiting(thread, awaiting);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_without_overrides_membership_tracks_topic(
        topics in proptest::collection::vec(arb_topic(), 1..40)
    ) {
        let mut store = ConversationStore::new();
        for topic in &topics {
            run_pass(&mut store, "t", topic, None);
            prop_assert_eq!(store.is_awaiting("t"), topic != RANDOM_TOPIC);
        }
    }

    #[test]
    fn prop_membership_changes_only_on_random_boundaries(
        topics in proptest::collection::vec(arb_topic(), 1..40)
    ) {
        let mut store = ConversationStore::new();
        let mut enters = 0;
        let mut leaves = 0;
        let mut expected_enters = 0;
        let mut expected_leaves = 0;
        let mut previous = RANDOM_TOPIC.to_string();

        for topic in &topics {
            let before = store.is_awaiting("t");
            run_pass(&mut store, "t", topic, None);
            let after = store.is_awaiting("t");
            if !before && after { enters += 1; }
            if before && !after { leaves += 1; }
            if previous == RANDOM_TOPIC && topic != RANDOM_TOPIC { expected_enters += 1; }
            if previous != RANDOM_TOPIC && topic == RANDOM_TOPIC { expected_leaves += 1; }
            previous.clone_from(topic);
        }

        prop_assert_eq!(enters, expected_enters);
        prop_assert_eq!(leaves, expected_leaves);
    }

    #[test]
    fn prop_manual_override_holds_until_next_automatic_transition(
        steps in proptest::collection::vec(arb_step(), 1..40)
    ) {
        let mut store = ConversationStore::new();
        let mut expected = false;
        let mut previous = RANDOM_TOPIC.to_string();

        for Step::Reply { topic, manual } in &steps {
            run_pass(&mut store, "t", topic, *manual);
            if let Some(flag) = manual {
                expected = *flag;
            } else if previous == RANDOM_TOPIC && topic != RANDOM_TOPIC {
                expected = true;
            } else if previous != RANDOM_TOPIC && topic == RANDOM_TOPIC {
                expected = false;
            }
            prop_assert_eq!(store.is_awaiting("t"), expected);
            previous.clone_from(topic);
        }
    }

    #[test]
    fn prop_threads_are_independent(
        a in proptest::collection::vec(arb_topic(), 1..20),
        b in proptest::collection::vec(arb_topic(), 1..20),
    ) {
        let mut store = ConversationStore::new();
        for (i, topic) in a.iter().enumerate() {
            run_pass(&mut store, "a", topic, None);
            if let Some(other) = b.get(i) {
                run_pass(&mut store, "b", other, None);
            }
        }
        let last_a = a.last().unwrap();
        prop_assert_eq!(store.is_awaiting("a"), last_a != RANDOM_TOPIC);
        if b.len() <= a.len() {
            let last_b = b.last().unwrap();
            prop_assert_eq!(store.is_awaiting("b"), last_b != RANDOM_TOPIC);
        }
    }

    #[test]
    fn prop_awaiting_list_has_no_duplicates(
        ops in proptest::collection::vec(("[a-c]", any::<bool>()), 0..60)
    ) {
        let mut store = ConversationStore::new();
        for (thread, flag) in &ops {
            store.set_awaiting(thread, *flag);
        }
        let mut list = store.list_awaiting();
        let len = list.len();
        list.sort();
        list.dedup();
        prop_assert_eq!(list.len(), len);
    }
}
