//! Routing policy
//!
//! Pure decision logic: given what is known about a message, pick exactly one
//! outcome. Randomness is passed in as a closure so tests can script the
//! draws.

use crate::config::RuntimeConfig;
use crate::transport::Reaction;

/// Facts about an inbound message the policy depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub is_group: bool,
    pub awaiting: bool,
    pub mentions_bot: bool,
    pub profane: bool,
    pub from_mirror_target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverseReason {
    Direct,
    Awaiting,
    Mentioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engagement {
    pub reaction: Reaction,
    /// Also hand the message to the dialogue engine
    pub forward: bool,
}

/// Outcome of routing one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Converse(ConverseReason),
    /// Warn about language and react with disapproval
    Police,
    /// Echo the body back verbatim
    Mirror,
    Engage(Engagement),
    Ignore,
}

/// First matching rule wins. `roll` is drawn at most twice, only when the
/// probabilistic branch is reached.
pub fn triage(signals: &Signals, config: &RuntimeConfig, mut roll: impl FnMut() -> f64) -> Route {
    if !signals.is_group {
        return Route::Converse(ConverseReason::Direct);
    }
    if signals.awaiting {
        return Route::Converse(ConverseReason::Awaiting);
    }
    if signals.mentions_bot {
        return Route::Converse(ConverseReason::Mentioned);
    }
    if signals.profane && config.police_swearing {
        return Route::Police;
    }
    if signals.from_mirror_target {
        return Route::Mirror;
    }
    if roll() < config.react_frequency {
        return Route::Engage(engagement(roll(), config));
    }
    Route::Ignore
}

/// Both thresholds are compared against the same draw
pub fn engagement(r: f64, config: &RuntimeConfig) -> Engagement {
    Engagement {
        reaction: if r < config.love_frequency {
            Reaction::Love
        } else {
            Reaction::Like
        },
        forward: r < config.cheer_frequency,
    }
}
