//! Mock implementations for testing
//!
//! These mocks let routing, subroutines and the runtime be exercised without
//! a chat network, HTTP or a rule corpus on disk.

use crate::config::{RuntimeConfig, RuntimeConfigHandle};
use crate::db::Database;
use crate::engine::{DialogueEngine, EngineError, EngineReply, ReplyRequest, SubroutineHost};
use crate::fetch::{FetchError, FetchErrorKind, MediaAsset, MediaSource, Quote, QuoteSource};
use crate::random::RandomSource;
use crate::router::{MessageRouter, ProfanityFilter};
use crate::state_machine::SharedState;
use crate::subroutines::{CallContext, Collaborators, SubroutineError};
use crate::transport::{
    HistoryMessage, InboundMessage, Outbound, Reaction, ThreadInfo, Transport, TransportError,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

// ============================================================================
// Mock Transport
// ============================================================================

#[derive(Default)]
struct TransportLog {
    sent: Vec<(String, Outbound)>,
    reactions: Vec<(String, Reaction)>,
    read_marks: Vec<String>,
    history: HashMap<String, Vec<HistoryMessage>>,
    inbound: VecDeque<InboundMessage>,
}

/// Transport that records everything the bot does
#[derive(Default)]
pub struct MockTransport {
    log: Mutex<TransportLog>,
    sent_signal: Notify,
    thread_info_fails: AtomicBool,
    hold_open: bool,
    listen_fails: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `listen` running after the queued messages are delivered
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn failing_listen(mut self) -> Self {
        self.listen_fails = true;
        self
    }

    pub fn queue_inbound(&self, messages: impl IntoIterator<Item = InboundMessage>) {
        self.log.lock().unwrap().inbound.extend(messages);
    }

    pub fn set_history(&self, thread_id: &str, history: Vec<HistoryMessage>) {
        self.log
            .lock()
            .unwrap()
            .history
            .insert(thread_id.to_string(), history);
    }

    pub fn fail_thread_info(&self) {
        self.thread_info_fails.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Outbound)> {
        self.log.lock().unwrap().sent.clone()
    }

    /// Text messages sent to one thread, in order
    pub fn sent_texts(&self, thread_id: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(thread, _)| thread == thread_id)
            .filter_map(|(_, content)| match content {
                Outbound::Text(text) => Some(text.clone()),
                Outbound::Attachment { .. } => None,
            })
            .collect()
    }

    pub fn reactions(&self) -> Vec<(String, Reaction)> {
        self.log.lock().unwrap().reactions.clone()
    }

    pub fn read_marks(&self) -> Vec<String> {
        self.log.lock().unwrap().read_marks.clone()
    }

    /// Wait until at least `count` messages were sent
    pub async fn wait_for_sent(&self, count: usize) -> Vec<(String, Outbound)> {
        let wait = async {
            loop {
                let notified = self.sent_signal.notified();
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for sent messages")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen(&self, events: mpsc::Sender<InboundMessage>) -> Result<(), TransportError> {
        let queued: Vec<InboundMessage> = self.log.lock().unwrap().inbound.drain(..).collect();
        for message in queued {
            events.send(message).await.map_err(|_| TransportError::Closed)?;
        }
        if self.listen_fails {
            return Err(TransportError::Closed);
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn send_message(&self, thread_id: &str, content: Outbound) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .sent
            .push((thread_id.to_string(), content));
        self.sent_signal.notify_waiters();
        Ok(())
    }

    async fn set_reaction(&self, message_id: &str, reaction: Reaction) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .reactions
            .push((message_id.to_string(), reaction));
        Ok(())
    }

    async fn mark_read(&self, thread_id: &str) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .read_marks
            .push(thread_id.to_string());
        Ok(())
    }

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, TransportError> {
        if self.thread_info_fails.load(Ordering::SeqCst) {
            return Err(TransportError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(ThreadInfo {
            name: format!("Thread {thread_id}"),
            message_count: 1,
            image_url: None,
        })
    }

    async fn thread_history(
        &self,
        thread_id: &str,
        count: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError> {
        let history = self
            .log
            .lock()
            .unwrap()
            .history
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        let skip = history.len().saturating_sub(count);
        Ok(history.into_iter().skip(skip).collect())
    }
}

// ============================================================================
// Scripted Dialogue Engine
// ============================================================================

/// One canned engine reply
#[derive(Debug, Clone, Default)]
pub struct ScriptedReply {
    text: Option<String>,
    calls: Vec<(String, Vec<String>)>,
    topic: Option<String>,
    assignments: Vec<(String, String)>,
    panic: bool,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Reply whose text is the result of a subroutine call
    pub fn call(name: &str, args: &[&str]) -> Self {
        Self {
            calls: vec![(
                name.to_string(),
                args.iter().map(ToString::to_string).collect(),
            )],
            ..Self::default()
        }
    }

    pub fn panic() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    pub fn with_assignment(mut self, name: &str, value: &str) -> Self {
        self.assignments.push((name.to_string(), value.to_string()));
        self
    }
}

/// Owned copy of a [`ReplyRequest`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub thread_id: String,
    pub text: String,
    pub topic: String,
    pub vars: HashMap<String, String>,
}

/// Engine that plays back queued replies
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    loaded: AtomicBool,
    echo: bool,
    reloads: AtomicUsize,
    fail_reload: AtomicBool,
    stalled_thread: Option<String>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(true),
            echo: false,
            reloads: AtomicUsize::new(0),
            fail_reload: AtomicBool::new(false),
            stalled_thread: None,
        }
    }

    /// Replies with the request text when nothing is queued
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Never answers requests from `thread_id`
    pub fn stall_thread(mut self, thread_id: &str) -> Self {
        self.stalled_thread = Some(thread_id.to_string());
        self
    }

    pub fn unloaded(self) -> Self {
        self.loaded.store(false, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn fail_next_reload(&self) {
        self.fail_reload.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DialogueEngine for ScriptedEngine {
    async fn reload(&self) -> Result<(), EngineError> {
        if self.fail_reload.swap(false, Ordering::SeqCst) {
            return Err(EngineError::NoRules(PathBuf::from("brain")));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn referenced_subroutines(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .flat_map(|r| r.calls.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    async fn reply(
        &self,
        request: ReplyRequest<'_>,
        host: &dyn SubroutineHost,
    ) -> Result<EngineReply, EngineError> {
        if !self.is_loaded() {
            return Err(EngineError::NotLoaded);
        }
        self.requests.lock().unwrap().push(RecordedRequest {
            thread_id: request.thread_id.to_string(),
            text: request.text.to_string(),
            topic: request.topic.to_string(),
            vars: request.vars.clone(),
        });
        if self.stalled_thread.as_deref() == Some(request.thread_id) {
            std::future::pending::<()>().await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        let script = match next {
            Some(script) => script,
            None if self.echo => ScriptedReply::text(request.text),
            None => return Err(EngineError::NoReplyMatched),
        };
        if script.panic {
            panic!("scripted engine panic");
        }

        let mut text = script.text.unwrap_or_default();
        for (name, args) in script.calls {
            text.push_str(&host.call(&name, args).await?);
        }

        Ok(EngineReply {
            text,
            topic: script.topic.unwrap_or_else(|| request.topic.to_string()),
            assignments: script.assignments,
        })
    }
}

// ============================================================================
// Scripted Randomness
// ============================================================================

/// Plays back fixed draws. Exhausted draws return 0.99 and index 0.
#[derive(Default)]
pub struct ScriptedRandom {
    values: Mutex<VecDeque<f64>>,
    indexes: Mutex<VecDeque<usize>>,
    bounds: Mutex<Vec<usize>>,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_indexes(self, indexes: impl IntoIterator<Item = usize>) -> Self {
        self.indexes.lock().unwrap().extend(indexes);
        self
    }

    /// `len` arguments seen by `below`
    pub fn below_bounds(&self) -> Vec<usize> {
        self.bounds.lock().unwrap().clone()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&self) -> f64 {
        self.values.lock().unwrap().pop_front().unwrap_or(0.99)
    }

    fn below(&self, len: usize) -> usize {
        self.bounds.lock().unwrap().push(len);
        let index = self.indexes.lock().unwrap().pop_front().unwrap_or(0);
        assert!(index < len, "scripted index {index} out of range {len}");
        index
    }
}

// ============================================================================
// Mock Fetch Clients
// ============================================================================

pub struct MockMedia {
    assets: Vec<MediaAsset>,
    data: Vec<u8>,
    failure: Option<FetchErrorKind>,
    searches: Mutex<Vec<String>>,
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::failing(FetchErrorKind::NotConfigured)
    }
}

impl MockMedia {
    pub fn with_assets(assets: Vec<MediaAsset>, data: Vec<u8>) -> Self {
        Self {
            assets,
            data,
            failure: None,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: FetchErrorKind) -> Self {
        Self {
            assets: Vec::new(),
            data: Vec::new(),
            failure: Some(kind),
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), FetchError> {
        match self.failure {
            Some(kind) => Err(FetchError::new(kind, "mock media failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaSource for MockMedia {
    async fn search(&self, query: &str) -> Result<Vec<MediaAsset>, FetchError> {
        self.searches.lock().unwrap().push(query.to_string());
        self.check()?;
        Ok(self.assets.clone())
    }

    async fn random(&self) -> Result<MediaAsset, FetchError> {
        self.check()?;
        self.assets
            .first()
            .cloned()
            .ok_or_else(|| FetchError::decode("no mock assets"))
    }

    async fn download(&self, _asset: &MediaAsset) -> Result<Vec<u8>, FetchError> {
        self.check()?;
        Ok(self.data.clone())
    }
}

pub struct MockQuotes {
    result: Result<Quote, FetchErrorKind>,
    categories: Mutex<Vec<String>>,
}

impl Default for MockQuotes {
    fn default() -> Self {
        Self::failing(FetchErrorKind::NotConfigured)
    }
}

impl MockQuotes {
    pub fn returning(text: &str, author: &str) -> Self {
        Self {
            result: Ok(Quote {
                text: text.to_string(),
                author: author.to_string(),
            }),
            categories: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: FetchErrorKind) -> Self {
        Self {
            result: Err(kind),
            categories: Mutex::new(Vec::new()),
        }
    }

    pub fn categories(&self) -> Vec<String> {
        self.categories.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteSource for MockQuotes {
    async fn quote_of_the_day(&self, category: &str) -> Result<Quote, FetchError> {
        self.categories.lock().unwrap().push(category.to_string());
        self.result
            .clone()
            .map_err(|kind| FetchError::new(kind, "mock quote failure"))
    }
}

// ============================================================================
// Test Bot Builder
// ============================================================================

/// A fully wired router over mocks
pub struct TestBot {
    pub state: Arc<SharedState>,
    pub transport: Arc<MockTransport>,
    pub engine: Arc<ScriptedEngine>,
    pub media: Arc<MockMedia>,
    pub quotes: Arc<MockQuotes>,
    pub config: Arc<RuntimeConfigHandle>,
    pub db: Database,
    pub router: Arc<MessageRouter>,
    dir: TempDir,
}

impl TestBot {
    pub fn builder() -> TestBotBuilder {
        TestBotBuilder::default()
    }

    /// Call a subroutine by name on behalf of `context`
    pub async fn call(
        &self,
        context: &CallContext,
        name: &str,
        args: &[&str],
    ) -> Result<String, SubroutineError> {
        let args = args.iter().map(ToString::to_string).collect();
        self.router.registry().bind(context).call(name, args).await
    }

    /// Write the runtime config file the reload subroutine reads
    pub fn write_runtime_config(&self, config: &RuntimeConfig) {
        let json = serde_json::to_string_pretty(config).unwrap();
        std::fs::write(self.config.path(), json).unwrap();
    }

    pub fn media_dir(&self) -> PathBuf {
        self.dir.path().join("gifs")
    }
}

#[derive(Default)]
pub struct TestBotBuilder {
    config: Option<RuntimeConfig>,
    engine: Option<ScriptedEngine>,
    random: Option<ScriptedRandom>,
    media: Option<MockMedia>,
    quotes: Option<MockQuotes>,
    bot_id: Option<String>,
}

impl TestBotBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn engine(mut self, engine: ScriptedEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn random(mut self, random: ScriptedRandom) -> Self {
        self.random = Some(random);
        self
    }

    pub fn media(mut self, media: MockMedia) -> Self {
        self.media = Some(media);
        self
    }

    pub fn quotes(mut self, quotes: MockQuotes) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub fn bot_id(mut self, bot_id: &str) -> Self {
        self.bot_id = Some(bot_id.to_string());
        self
    }

    pub fn build(self) -> TestBot {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("gifs")).unwrap();

        let state = Arc::new(SharedState::new());
        let transport = Arc::new(MockTransport::new());
        let engine = Arc::new(self.engine.unwrap_or_default());
        let media = Arc::new(self.media.unwrap_or_default());
        let quotes = Arc::new(self.quotes.unwrap_or_default());
        let config = Arc::new(RuntimeConfigHandle::new(
            dir.path().join("bot_data.json"),
            self.config.unwrap_or_default(),
        ));
        let db = Database::open_in_memory().unwrap();

        let deps = Collaborators {
            state: Arc::clone(&state),
            transport: transport.clone(),
            engine: engine.clone(),
            config: Arc::clone(&config),
            media: media.clone(),
            quotes: quotes.clone(),
            saved: Arc::new(db.clone()),
            random: Arc::new(self.random.unwrap_or_default()),
            media_dir: dir.path().join("gifs"),
            bot_id: self.bot_id.unwrap_or_else(|| "bot".to_string()),
        };
        let router = Arc::new(MessageRouter::new(deps, ProfanityFilter::default()));

        TestBot {
            state,
            transport,
            engine,
            media,
            quotes,
            config,
            db,
            router,
            dir,
        }
    }
}
