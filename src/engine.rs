//! Dialogue engine adapter
//!
//! The router asks a [`DialogueEngine`] for replies. Engines resolve
//! `<call>` tags through a [`SubroutineHost`] bound to the message being
//! routed. Per-thread variables (including the topic) live in the
//! conversation store; the engine receives them with each request and hands
//! back the topic and any assignments it made.

pub mod brain;
mod parser;

pub use brain::BrainEngine;

use crate::subroutines::SubroutineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Marker a reply carries when a subroutine already delivered the response
pub const NO_MESSAGE_MARKER: &str = "NOMESSAGE";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no rules are loaded")]
    NotLoaded,
    #[error("no reply matched")]
    NoReplyMatched,
    #[error("failed to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no rule files found in {0}")]
    NoRules(PathBuf),
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("{location}: unknown subroutine `{name}`")]
    UnknownSubroutine { name: String, location: String },
    #[error(transparent)]
    Subroutine(#[from] SubroutineError),
}

/// Input for one reply
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub thread_id: &'a str,
    pub text: &'a str,
    pub topic: &'a str,
    pub vars: &'a HashMap<String, String>,
}

/// A generated reply plus the state changes it asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReply {
    pub text: String,
    /// Topic of the thread after this reply
    pub topic: String,
    /// `<set>` assignments, in order
    pub assignments: Vec<(String, String)>,
}

impl EngineReply {
    pub fn is_suppressed(&self) -> bool {
        self.text.contains(NO_MESSAGE_MARKER)
    }
}

/// Resolves subroutine calls made from rule text
#[async_trait]
pub trait SubroutineHost: Send + Sync {
    async fn call(&self, name: &str, args: Vec<String>) -> Result<String, SubroutineError>;
}

#[async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Reload the rule corpus. On failure the previous rules stay active.
    async fn reload(&self) -> Result<(), EngineError>;

    fn is_loaded(&self) -> bool;

    /// Subroutine names the active rules call
    fn referenced_subroutines(&self) -> Vec<String>;

    async fn reply(
        &self,
        request: ReplyRequest<'_>,
        host: &dyn SubroutineHost,
    ) -> Result<EngineReply, EngineError>;
}

#[async_trait]
impl<T: DialogueEngine + ?Sized> DialogueEngine for Arc<T> {
    async fn reload(&self) -> Result<(), EngineError> {
        (**self).reload().await
    }

    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }

    fn referenced_subroutines(&self) -> Vec<String> {
        (**self).referenced_subroutines()
    }

    async fn reply(
        &self,
        request: ReplyRequest<'_>,
        host: &dyn SubroutineHost,
    ) -> Result<EngineReply, EngineError> {
        (**self).reply(request, host).await
    }
}
