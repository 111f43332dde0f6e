//! Message router
//!
//! Entry point for every inbound message. Picks one outcome per message
//! (see [`policy::triage`]), carries it out, and marks the thread read.

pub mod policy;
mod profanity;

pub use policy::{triage, ConverseReason, Route, Signals};
pub use profanity::ProfanityFilter;

use crate::config::RuntimeConfigHandle;
use crate::engine::{DialogueEngine, EngineError, ReplyRequest};
use crate::random::RandomSource;
use crate::state_machine::{awaiting_transition, SharedState};
use crate::subroutines::{CallContext, Collaborators, SubroutineRegistry};
use crate::transport::{InboundMessage, Outbound, Reaction, ThreadInfo, Transport};
use chrono::Local;
use std::sync::Arc;

pub const LANGUAGE_WARNING: &str = "Language!";
/// Sent instead of a reply while no rules are loaded
pub const NOT_LOADED_REPLY: &str = "I'm sorry, I've forgotten how to talk.";

const DATE_FORMAT: &str = "%-m/%-d/%Y %-I:%M:%S %p";

pub struct MessageRouter {
    state: Arc<SharedState>,
    transport: Arc<dyn Transport>,
    engine: Arc<dyn DialogueEngine>,
    config: Arc<RuntimeConfigHandle>,
    random: Arc<dyn RandomSource>,
    registry: SubroutineRegistry,
    profanity: ProfanityFilter,
    bot_id: String,
}

impl MessageRouter {
    pub fn new(deps: Collaborators, profanity: ProfanityFilter) -> Self {
        Self {
            state: Arc::clone(&deps.state),
            transport: Arc::clone(&deps.transport),
            engine: Arc::clone(&deps.engine),
            config: Arc::clone(&deps.config),
            random: Arc::clone(&deps.random),
            bot_id: deps.bot_id.clone(),
            registry: SubroutineRegistry::new(deps),
            profanity,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SubroutineRegistry {
        &self.registry
    }

    fn observe(&self, message: &InboundMessage, police_swearing: bool) -> Signals {
        let mirror_target = self.state.mirror_target();
        Signals {
            is_group: message.is_group,
            awaiting: self.state.is_awaiting(&message.thread_id),
            mentions_bot: message.mentions_user(&self.bot_id),
            profane: police_swearing && self.profanity.is_profane(&message.body),
            from_mirror_target: mirror_target.as_deref() == Some(message.sender_id.as_str()),
        }
    }

    /// Handle one message. Never fails; problems are logged.
    pub async fn route(&self, message: InboundMessage) {
        let config = self.config.snapshot();
        let signals = self.observe(&message, config.police_swearing);
        let route = triage(&signals, &config, || self.random.next_f64());

        tracing::debug!(
            thread_id = %message.thread_id,
            message_id = %message.message_id,
            route = ?route,
            "Routing message"
        );

        match route {
            Route::Converse(reason) => {
                if reason == ConverseReason::Mentioned {
                    tracing::info!(thread_id = %message.thread_id, "Bot mentioned, responding");
                }
                self.converse(&message).await;
            }
            Route::Police => {
                tracing::info!(thread_id = %message.thread_id, sender_id = %message.sender_id, "Policing language");
                self.send_text(&message.thread_id, LANGUAGE_WARNING).await;
                self.react(&message.message_id, Reaction::Sad).await;
            }
            Route::Mirror => {
                self.send_text(&message.thread_id, &message.body).await;
            }
            Route::Engage(engagement) => {
                if engagement.forward {
                    tracing::info!(thread_id = %message.thread_id, "Sending a cheer");
                    self.converse(&message).await;
                }
                self.react(&message.message_id, engagement.reaction).await;
            }
            Route::Ignore => {}
        }

        if let Err(e) = self.transport.mark_read(&message.thread_id).await {
            tracing::warn!(thread_id = %message.thread_id, error = %e, "Failed to mark thread read");
        }
    }

    /// Hand the message to the dialogue engine and deliver its reply
    async fn converse(&self, message: &InboundMessage) {
        let thread_id = message.thread_id.as_str();
        if !self.engine.is_loaded() {
            self.send_text(thread_id, NOT_LOADED_REPLY).await;
            return;
        }

        let previous_topic = self.state.topic(thread_id);
        let text = strip_mentions(message);

        let info = match self.transport.thread_info(thread_id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Failed to fetch thread info");
                ThreadInfo::default()
            }
        };
        let vars = self.state.update(|store| {
            for (name, value) in message_vars(message, &info) {
                store.set_var(thread_id, name, value);
            }
            store.vars(thread_id)
        });

        let context = CallContext::new(message.clone());
        let host = self.registry.bind(&context);
        let request = ReplyRequest {
            thread_id,
            text: &text,
            topic: &previous_topic,
            vars: &vars,
        };

        let reply = match self.engine.reply(request, &host).await {
            Ok(reply) => reply,
            Err(EngineError::NotLoaded) => {
                self.send_text(thread_id, NOT_LOADED_REPLY).await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    thread_id = %thread_id,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to generate reply"
                );
                return;
            }
        };

        self.state.update(|store| {
            store.set_topic(thread_id, reply.topic.as_str());
            for (name, value) in &reply.assignments {
                store.set_var(thread_id, name.as_str(), value.as_str());
            }
        });

        if reply.is_suppressed() {
            tracing::debug!(thread_id = %thread_id, "Reply suppressed");
        } else if !reply.text.is_empty() {
            self.send_text(thread_id, &reply.text).await;
        }

        let change = awaiting_transition(&previous_topic, &reply.topic, context.manual_wait());
        if self.state.apply(thread_id, change) {
            tracing::info!(
                thread_id = %thread_id,
                from = %previous_topic,
                to = %reply.topic,
                change = ?change,
                "Awaiting membership changed"
            );
        }
    }

    async fn send_text(&self, thread_id: &str, text: &str) {
        if let Err(e) = self.transport.send_message(thread_id, Outbound::text(text)).await {
            tracing::warn!(thread_id = %thread_id, error = %e, "Failed to send message");
        }
    }

    async fn react(&self, message_id: &str, reaction: Reaction) {
        if let Err(e) = self.transport.set_reaction(message_id, reaction).await {
            tracing::warn!(message_id = %message_id, reaction = %reaction, error = %e, "Failed to react");
        }
    }
}

/// Remove mention tags from the body
fn strip_mentions(message: &InboundMessage) -> String {
    message
        .mentions()
        .iter()
        .fold(message.body.clone(), |body, mention| body.replace(&mention.tag, ""))
}

/// Variables the engine sees for this message
fn message_vars(message: &InboundMessage, info: &ThreadInfo) -> [(&'static str, String); 8] {
    let mentions = message
        .mentions()
        .iter()
        .map(|m| m.user_id.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    [
        ("mentions", mentions),
        ("userID", message.sender_id.clone()),
        ("messageID", message.message_id.clone()),
        ("threadID", message.thread_id.clone()),
        ("threadName", info.name.clone()),
        ("threadMessageCount", info.message_count.to_string()),
        ("threadImage", info.image_url.clone().unwrap_or_default()),
        ("date", Local::now().format(DATE_FORMAT).to_string()),
    ]
}
