//! Chat transport abstraction
//!
//! The router only talks to the chat network through the [`Transport`] trait.
//! Login and session persistence for a real network live behind an
//! implementation of this trait; the bundled [`ConsoleTransport`] drives the
//! bot from stdin for local use.

mod console;

pub use console::ConsoleTransport;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A user mentioned in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub user_id: String,
    /// The text of the mention as it appears in the body, e.g. `@Bot`
    pub tag: String,
}

impl Mention {
    pub fn new(user_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tag: tag.into(),
        }
    }
}

/// One inbound chat event, scoped to a single routing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub body: String,
    mentions: Vec<Mention>,
    pub thread_id: String,
    pub message_id: String,
    pub is_group: bool,
}

impl InboundMessage {
    pub fn new(
        thread_id: impl Into<String>,
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            body: body.into(),
            mentions: Vec::new(),
            thread_id: thread_id.into(),
            message_id: message_id.into(),
            is_group: false,
        }
    }

    #[must_use]
    pub fn in_group(mut self) -> Self {
        self.is_group = true;
        self
    }

    /// Add a mention. Mentions are a set keyed by user id; repeats are ignored.
    #[must_use]
    pub fn with_mention(mut self, mention: Mention) -> Self {
        if !self.mentions.iter().any(|m| m.user_id == mention.user_id) {
            self.mentions.push(mention);
        }
        self
    }

    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }

    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|m| m.user_id == user_id)
    }
}

/// Reactions the bot attaches to messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    Like,
    Love,
    /// Disapproval, used when policing language
    Sad,
    /// Marks a message that was just saved
    Wow,
}

impl Reaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Like => ":like:",
            Reaction::Love => ":love:",
            Reaction::Sad => ":sad:",
            Reaction::Wow => ":wow:",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Attachment { file_name: String, data: Vec<u8> },
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Outbound::Text(text.into())
    }
}

/// Metadata about a thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    pub name: String,
    pub message_count: u64,
    pub image_url: Option<String>,
}

/// A previously delivered message, as returned by thread history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub message_id: String,
    pub sender_id: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("thread not found: {0}")]
    ThreadNotFound(String),
    #[error("listener closed")]
    Closed,
    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Operations the router needs from a chat network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver inbound events into `events` until the network goes away
    async fn listen(&self, events: mpsc::Sender<InboundMessage>) -> Result<(), TransportError>;

    async fn send_message(&self, thread_id: &str, content: Outbound) -> Result<(), TransportError>;

    async fn set_reaction(&self, message_id: &str, reaction: Reaction) -> Result<(), TransportError>;

    async fn mark_read(&self, thread_id: &str) -> Result<(), TransportError>;

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, TransportError>;

    /// The last `count` messages of the thread, oldest first
    async fn thread_history(
        &self,
        thread_id: &str,
        count: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn listen(&self, events: mpsc::Sender<InboundMessage>) -> Result<(), TransportError> {
        (**self).listen(events).await
    }

    async fn send_message(&self, thread_id: &str, content: Outbound) -> Result<(), TransportError> {
        (**self).send_message(thread_id, content).await
    }

    async fn set_reaction(&self, message_id: &str, reaction: Reaction) -> Result<(), TransportError> {
        (**self).set_reaction(message_id, reaction).await
    }

    async fn mark_read(&self, thread_id: &str) -> Result<(), TransportError> {
        (**self).mark_read(thread_id).await
    }

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, TransportError> {
        (**self).thread_info(thread_id).await
    }

    async fn thread_history(
        &self,
        thread_id: &str,
        count: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError> {
        (**self).thread_history(thread_id, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_are_deduplicated_by_user() {
        let msg = InboundMessage::new("t1", "m1", "alice", "hi @Bob @Bob")
            .with_mention(Mention::new("bob", "@Bob"))
            .with_mention(Mention::new("bob", "@Bobby"))
            .with_mention(Mention::new("carol", "@Carol"));

        assert_eq!(msg.mentions().len(), 2);
        assert_eq!(msg.mentions()[0].tag, "@Bob");
        assert!(msg.mentions_user("carol"));
        assert!(!msg.mentions_user("alice"));
    }

    #[test]
    fn test_reaction_names() {
        assert_eq!(Reaction::Love.to_string(), ":love:");
        assert_eq!(Reaction::Sad.as_str(), ":sad:");
    }
}
