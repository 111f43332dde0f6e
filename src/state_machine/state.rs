//! Conversation state types

use std::collections::HashMap;

/// Topic of a thread with no active dialogue flow
pub const RANDOM_TOPIC: &str = "random";

/// Per-thread state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    pub topic: String,
    /// Engine variables (`mentions`, `threadName`, ...)
    pub vars: HashMap<String, String>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            topic: RANDOM_TOPIC.to_string(),
            vars: HashMap::new(),
        }
    }
}

/// Routing state shared by every conversation
///
/// Holds the per-thread topic and variables, the awaiting-response set and
/// the process-wide mirror target. Performs no I/O; callers serialize access
/// through [`super::SharedState`].
#[derive(Debug, Default)]
pub struct ConversationStore {
    threads: HashMap<String, ThreadState>,
    /// Threads awaiting a response, in insertion order
    awaiting: Vec<String>,
    mirror_target: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn thread_mut(&mut self, thread_id: &str) -> &mut ThreadState {
        self.threads.entry(thread_id.to_string()).or_default()
    }

    /// Current topic, `"random"` for unseen threads
    pub fn topic(&self, thread_id: &str) -> String {
        self.threads
            .get(thread_id)
            .map_or_else(|| RANDOM_TOPIC.to_string(), |t| t.topic.clone())
    }

    pub fn set_topic(&mut self, thread_id: &str, topic: impl Into<String>) {
        self.thread_mut(thread_id).topic = topic.into();
    }

    pub fn is_awaiting(&self, thread_id: &str) -> bool {
        self.awaiting.iter().any(|t| t == thread_id)
    }

    /// Set awaiting membership. Returns `true` if membership changed.
    pub fn set_awaiting(&mut self, thread_id: &str, awaiting: bool) -> bool {
        let position = self.awaiting.iter().position(|t| t == thread_id);
        match (awaiting, position) {
            (true, None) => {
                self.awaiting.push(thread_id.to_string());
                true
            }
            (false, Some(index)) => {
                self.awaiting.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn list_awaiting(&self) -> Vec<String> {
        self.awaiting.clone()
    }

    pub fn var(&self, thread_id: &str, name: &str) -> Option<String> {
        self.threads.get(thread_id)?.vars.get(name).cloned()
    }

    pub fn set_var(&mut self, thread_id: &str, name: impl Into<String>, value: impl Into<String>) {
        self.thread_mut(thread_id)
            .vars
            .insert(name.into(), value.into());
    }

    pub fn vars(&self, thread_id: &str) -> HashMap<String, String> {
        self.threads
            .get(thread_id)
            .map(|t| t.vars.clone())
            .unwrap_or_default()
    }

    pub fn mirror_target(&self) -> Option<&str> {
        self.mirror_target.as_deref()
    }

    pub fn set_mirror_target(&mut self, target: Option<String>) {
        self.mirror_target = target;
    }
}
