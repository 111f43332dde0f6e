//! Line-oriented transport over stdin/stdout
//!
//! Input lines look like `THREAD/SENDER: body`. Threads whose id starts with
//! `#` are group chats, and `@name` tokens mention user `name`.

use super::{HistoryMessage, InboundMessage, Mention, Outbound, Reaction, ThreadInfo, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Messages kept per thread for history lookups
const HISTORY_LIMIT: usize = 50;

#[derive(Default)]
pub struct ConsoleTransport {
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    stdout: tokio::sync::Mutex<Option<tokio::io::Stdout>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, thread_id: &str, message: HistoryMessage) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = history.entry(thread_id.to_string()).or_default();
        entries.push(message);
        if entries.len() > HISTORY_LIMIT {
            let excess = entries.len() - HISTORY_LIMIT;
            entries.drain(..excess);
        }
    }

    async fn write_line(&self, line: String) -> Result<(), TransportError> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard.get_or_insert_with(tokio::io::stdout);
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Parse one console line into a message. Returns `None` for malformed lines.
pub(crate) fn parse_line(line: &str, message_id: String) -> Option<InboundMessage> {
    let (address, body) = line.split_once(':')?;
    let (thread_id, sender_id) = address.trim().split_once('/')?;
    let (thread_id, sender_id) = (thread_id.trim(), sender_id.trim());
    if thread_id.is_empty() || sender_id.is_empty() {
        return None;
    }
    let body = body.trim();

    let mut message = InboundMessage::new(thread_id, message_id, sender_id, body);
    if thread_id.starts_with('#') {
        message = message.in_group();
    }
    for token in body.split_whitespace() {
        let tag = token.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if let Some(user) = tag.strip_prefix('@') {
            if !user.is_empty() {
                message = message.with_mention(Mention::new(user, tag));
            }
        }
    }
    Some(message)
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn listen(&self, events: mpsc::Sender<InboundMessage>) -> Result<(), TransportError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(message) = parse_line(&line, uuid::Uuid::new_v4().to_string()) else {
                tracing::warn!(line = %line, "Ignoring malformed console line (expected THREAD/SENDER: body)");
                continue;
            };
            self.record(
                &message.thread_id,
                HistoryMessage {
                    message_id: message.message_id.clone(),
                    sender_id: message.sender_id.clone(),
                    body: message.body.clone(),
                },
            );
            if events.send(message).await.is_err() {
                return Err(TransportError::Closed);
            }
        }
        tracing::info!("Console input closed");
        Ok(())
    }

    async fn send_message(&self, thread_id: &str, content: Outbound) -> Result<(), TransportError> {
        let line = match &content {
            Outbound::Text(text) => format!("[{thread_id}] {text}"),
            Outbound::Attachment { file_name, data } => {
                format!("[{thread_id}] <attachment {file_name} ({} bytes)>", data.len())
            }
        };
        if let Outbound::Text(text) = content {
            self.record(
                thread_id,
                HistoryMessage {
                    message_id: uuid::Uuid::new_v4().to_string(),
                    sender_id: "bot".to_string(),
                    body: text,
                },
            );
        }
        self.write_line(line).await
    }

    async fn set_reaction(&self, message_id: &str, reaction: Reaction) -> Result<(), TransportError> {
        self.write_line(format!("<reaction {reaction} on {message_id}>")).await
    }

    async fn mark_read(&self, _thread_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, TransportError> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let count = history.get(thread_id).map_or(0, Vec::len);
        Ok(ThreadInfo {
            name: thread_id.to_string(),
            message_count: count as u64,
            image_url: None,
        })
    }

    async fn thread_history(
        &self,
        thread_id: &str,
        count: usize,
    ) -> Result<Vec<HistoryMessage>, TransportError> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = history
            .get(thread_id)
            .ok_or_else(|| TransportError::ThreadNotFound(thread_id.to_string()))?;
        let start = entries.len().saturating_sub(count);
        Ok(entries[start..].to_vec())
    }
}
