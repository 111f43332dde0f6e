//! Subroutine registry
//!
//! Rule text invokes side-effecting actions by name. The set of actions is
//! closed: every name maps to a [`SubroutineKind`], and each kind has one
//! handler returning a [`SubroutineOutput`].

mod control;
mod media;
mod quotes;
mod saved;

use crate::config::RuntimeConfigHandle;
use crate::db::{DbError, SavedMessages};
use crate::engine::{DialogueEngine, SubroutineHost, NO_MESSAGE_MARKER};
use crate::fetch::{MediaSource, QuoteSource};
use crate::random::RandomSource;
use crate::state_machine::SharedState;
use crate::transport::{InboundMessage, Transport, TransportError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Every subroutine rule text may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubroutineKind {
    Wait,
    WhoIsAwaiting,
    Mirror,
    Unmirror,
    Reload,
    FetchMedia,
    FetchRandomMedia,
    FetchLocalMedia,
    FetchQuote,
    SaveMessage,
    RecallMessage,
    DeleteMessage,
    ListMessages,
    CurrentTopic,
}

impl SubroutineKind {
    pub const ALL: [SubroutineKind; 14] = [
        Self::Wait,
        Self::WhoIsAwaiting,
        Self::Mirror,
        Self::Unmirror,
        Self::Reload,
        Self::FetchMedia,
        Self::FetchRandomMedia,
        Self::FetchLocalMedia,
        Self::FetchQuote,
        Self::SaveMessage,
        Self::RecallMessage,
        Self::DeleteMessage,
        Self::ListMessages,
        Self::CurrentTopic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::WhoIsAwaiting => "whoIsAwaiting",
            Self::Mirror => "mirror",
            Self::Unmirror => "unmirror",
            Self::Reload => "reload",
            Self::FetchMedia => "fetchMedia",
            Self::FetchRandomMedia => "fetchRandomMedia",
            Self::FetchLocalMedia => "fetchLocalMedia",
            Self::FetchQuote => "fetchQuote",
            Self::SaveMessage => "saveMessage",
            Self::RecallMessage => "recallMessage",
            Self::DeleteMessage => "deleteMessage",
            Self::ListMessages => "listMessages",
            Self::CurrentTopic => "currentTopic",
        }
    }

    /// Name used by older rule files
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::WhoIsAwaiting => "waitwho",
            Self::Mirror => "spam",
            Self::Unmirror => "stopSpam",
            Self::Reload => "update",
            Self::FetchMedia => "gif",
            Self::FetchRandomMedia => "randomgif",
            Self::FetchLocalMedia => "classicgif",
            Self::FetchQuote => "quote",
            Self::SaveMessage => "save",
            Self::RecallMessage => "recall",
            Self::DeleteMessage => "delete",
            Self::ListMessages => "list",
            Self::CurrentTopic => "topic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name || kind.legacy_name() == name)
    }
}

impl fmt::Display for SubroutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubroutineKind {
    type Err = SubroutineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| SubroutineError::Unknown(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum SubroutineError {
    #[error("unknown subroutine `{0}`")]
    Unknown(String),
    #[error("invalid arguments for {kind}: {reason}")]
    InvalidArguments {
        kind: SubroutineKind,
        reason: String,
    },
    #[error("nothing saved under `{0}`")]
    NotFound(String),
    #[error("no earlier message in thread {0}")]
    NoHistory(String),
    #[error(transparent)]
    Store(#[from] DbError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("reload failed: {0}")]
    Reload(String),
}

impl SubroutineError {
    pub(crate) fn invalid(kind: SubroutineKind, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result of a handler
pub enum SubroutineOutput {
    Immediate(String),
    /// Text available once the I/O completes
    Deferred(BoxFuture<'static, Result<String, SubroutineError>>),
    /// Response was delivered out of band
    Suppressed,
}

impl SubroutineOutput {
    pub fn empty() -> Self {
        Self::Immediate(String::new())
    }

    /// Text to splice into the reply
    pub async fn resolve(self) -> Result<String, SubroutineError> {
        match self {
            Self::Immediate(text) => Ok(text),
            Self::Deferred(future) => future.await,
            Self::Suppressed => Ok(NO_MESSAGE_MARKER.to_string()),
        }
    }
}

impl fmt::Debug for SubroutineOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(text) => f.debug_tuple("Immediate").field(text).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Suppressed => f.write_str("Suppressed"),
        }
    }
}

/// The message a routing pass is handling, plus what its calls changed
#[derive(Debug)]
pub struct CallContext {
    pub message: InboundMessage,
    manual_wait: Mutex<Option<bool>>,
}

impl CallContext {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            message,
            manual_wait: Mutex::new(None),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.message.thread_id
    }

    /// Awaiting membership forced by `wait` during this pass, last call wins
    pub fn manual_wait(&self) -> Option<bool> {
        *self
            .manual_wait
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_wait(&self, awaiting: bool) {
        *self
            .manual_wait
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(awaiting);
    }
}

/// Everything the handlers talk to
#[derive(Clone)]
pub struct Collaborators {
    pub state: Arc<SharedState>,
    pub transport: Arc<dyn Transport>,
    pub engine: Arc<dyn DialogueEngine>,
    pub config: Arc<RuntimeConfigHandle>,
    pub media: Arc<dyn MediaSource>,
    pub quotes: Arc<dyn QuoteSource>,
    pub saved: Arc<dyn SavedMessages>,
    pub random: Arc<dyn RandomSource>,
    pub media_dir: PathBuf,
    pub bot_id: String,
}

pub struct SubroutineRegistry {
    state: Arc<SharedState>,
    transport: Arc<dyn Transport>,
    engine: Arc<dyn DialogueEngine>,
    config: Arc<RuntimeConfigHandle>,
    media: Arc<dyn MediaSource>,
    quotes: Arc<dyn QuoteSource>,
    saved: Arc<dyn SavedMessages>,
    random: Arc<dyn RandomSource>,
    media_dir: PathBuf,
    bot_id: String,
}

impl SubroutineRegistry {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            state: deps.state,
            transport: deps.transport,
            engine: deps.engine,
            config: deps.config,
            media: deps.media,
            quotes: deps.quotes,
            saved: deps.saved,
            random: deps.random,
            media_dir: deps.media_dir,
            bot_id: deps.bot_id,
        }
    }

    /// Run the handler for `kind`
    pub fn invoke(
        &self,
        kind: SubroutineKind,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        match kind {
            SubroutineKind::Wait => self.wait(args, context),
            SubroutineKind::WhoIsAwaiting => Ok(self.who_is_awaiting()),
            SubroutineKind::Mirror => self.mirror(context),
            SubroutineKind::Unmirror => Ok(self.unmirror()),
            SubroutineKind::Reload => Ok(self.reload()),
            SubroutineKind::FetchMedia => self.fetch_media(args, context),
            SubroutineKind::FetchRandomMedia => Ok(self.fetch_random_media(context)),
            SubroutineKind::FetchLocalMedia => self.fetch_local_media(args, context),
            SubroutineKind::FetchQuote => Ok(self.fetch_quote(args)),
            SubroutineKind::SaveMessage => self.save_message(args, context),
            SubroutineKind::RecallMessage => self.recall_message(args, context),
            SubroutineKind::DeleteMessage => self.delete_message(args, context),
            SubroutineKind::ListMessages => Ok(self.list_messages(context)),
            SubroutineKind::CurrentTopic => Ok(SubroutineOutput::Immediate(
                self.state.topic(context.thread_id()),
            )),
        }
    }

    /// Host that resolves calls on behalf of one routing pass
    pub fn bind<'a>(&'a self, context: &'a CallContext) -> Invocation<'a> {
        Invocation {
            registry: self,
            context,
        }
    }
}

/// A registry bound to the message being routed
pub struct Invocation<'a> {
    registry: &'a SubroutineRegistry,
    context: &'a CallContext,
}

#[async_trait]
impl SubroutineHost for Invocation<'_> {
    async fn call(&self, name: &str, args: Vec<String>) -> Result<String, SubroutineError> {
        let kind: SubroutineKind = name.parse()?;
        tracing::debug!(
            thread_id = %self.context.thread_id(),
            subroutine = %kind,
            args = ?args,
            "Invoking subroutine"
        );
        let output = self.registry.invoke(kind, &args, self.context)?;
        output.resolve().await.inspect_err(|e| {
            tracing::warn!(
                thread_id = %self.context.thread_id(),
                subroutine = %kind,
                error = %e,
                "Subroutine failed"
            );
        })
    }
}

/// Words of a multi-word name argument, or an error if there are none
fn joined_name(kind: SubroutineKind, args: &[String]) -> Result<String, SubroutineError> {
    let name = args.join(" ");
    if name.trim().is_empty() {
        return Err(SubroutineError::invalid(kind, "a name is required"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_aliases_resolve() {
        for kind in SubroutineKind::ALL {
            assert_eq!(SubroutineKind::from_name(kind.name()), Some(kind));
            assert_eq!(SubroutineKind::from_name(kind.legacy_name()), Some(kind));
        }
        assert_eq!("gif".parse::<SubroutineKind>().unwrap(), SubroutineKind::FetchMedia);
        assert!(matches!(
            "launchRockets".parse::<SubroutineKind>(),
            Err(SubroutineError::Unknown(name)) if name == "launchRockets"
        ));
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = SubroutineKind::ALL
            .iter()
            .flat_map(|k| [k.name(), k.legacy_name()])
            .collect();
        names.sort_unstable();
        names.dedup();
        // `wait` is its own alias
        assert_eq!(names.len(), SubroutineKind::ALL.len() * 2 - 1);
    }

    #[tokio::test]
    async fn test_output_resolution() {
        assert_eq!(
            SubroutineOutput::Immediate("hi".into()).resolve().await.unwrap(),
            "hi"
        );
        assert_eq!(
            SubroutineOutput::Suppressed.resolve().await.unwrap(),
            NO_MESSAGE_MARKER
        );
        let deferred = SubroutineOutput::Deferred(Box::pin(async { Ok("later".to_string()) }));
        assert_eq!(deferred.resolve().await.unwrap(), "later");
    }

    #[test]
    fn test_joined_name_requires_words() {
        assert_eq!(
            joined_name(SubroutineKind::SaveMessage, &["good".into(), "morning".into()]).unwrap(),
            "good morning"
        );
        assert!(matches!(
            joined_name(SubroutineKind::SaveMessage, &[]),
            Err(SubroutineError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_manual_wait_last_call_wins() {
        let context = CallContext::new(InboundMessage::new("t1", "m1", "u1", "hi"));
        assert_eq!(context.manual_wait(), None);
        context.record_wait(true);
        context.record_wait(false);
        assert_eq!(context.manual_wait(), Some(false));
    }
}
