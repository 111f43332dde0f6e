//! Pure awaiting-response transition
//!
//! Decides how a thread's awaiting membership changes after a reply, given
//! the topic before and after reply generation.

use super::state::RANDOM_TOPIC;

/// Change to apply to the awaiting-response set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitingChange {
    /// A dialogue flow was opened: wait for the next message
    Enter,
    /// The flow closed: stop waiting
    Leave,
    Unchanged,
}

impl AwaitingChange {
    /// Desired membership, if any
    pub fn membership(self) -> Option<bool> {
        match self {
            AwaitingChange::Enter => Some(true),
            AwaitingChange::Leave => Some(false),
            AwaitingChange::Unchanged => None,
        }
    }
}

/// Automatic awaiting transition for one routing pass.
///
/// `manual_override` is the last `wait` issued during the pass. A manual
/// override wins over the automatic rule for that pass; the next automatic
/// transition applies as usual.
pub fn awaiting_transition(
    previous_topic: &str,
    current_topic: &str,
    manual_override: Option<bool>,
) -> AwaitingChange {
    if manual_override.is_some() {
        return AwaitingChange::Unchanged;
    }
    let was_random = previous_topic == RANDOM_TOPIC;
    let is_random = current_topic == RANDOM_TOPIC;
    match (was_random, is_random) {
        (true, false) => AwaitingChange::Enter,
        (false, true) => AwaitingChange::Leave,
        _ => AwaitingChange::Unchanged,
    }
}
