//! Bundled rule engine
//!
//! Replies from a directory of `.rive` rule files. The parsed [`RuleBook`]
//! sits behind an `Arc` that reload swaps in one step, so routings already
//! in flight finish against the book they started with.

use super::parser::{normalize, RuleBook};
use super::{DialogueEngine, EngineError, EngineReply, ReplyRequest, SubroutineHost};
use crate::random::RandomSource;
use crate::state_machine::RANDOM_TOPIC;
use crate::subroutines::SubroutineKind;
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

const RULE_EXTENSION: &str = "rive";

static STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<star(\d*)>").expect("valid star regex"));
static GET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<get\s+([^\s>]+)\s*>").expect("valid get regex"));
static SET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<set\s+([^\s=>]+)\s*=\s*([^>]*)>").expect("valid set regex")
});
static TOPIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{topic=([^}\s]+)\}").expect("valid topic regex"));
static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<call>(.*?)</call>").expect("valid call regex"));

/// Stand-ins for tag delimiters inside substituted values, so text taken
/// from a message or variable is never read as a tag
const SHIELDED: [(char, char); 4] = [
    ('<', '\u{e000}'),
    ('>', '\u{e001}'),
    ('{', '\u{e002}'),
    ('}', '\u{e003}'),
];

fn shield(value: &str) -> String {
    value
        .chars()
        .map(|c| SHIELDED.iter().find(|(raw, _)| *raw == c).map_or(c, |(_, mark)| *mark))
        .collect()
}

fn unshield(text: &str) -> String {
    text.chars()
        .map(|c| SHIELDED.iter().find(|(_, mark)| *mark == c).map_or(c, |(raw, _)| *raw))
        .collect()
}

pub struct BrainEngine {
    rules_dir: PathBuf,
    book: RwLock<Option<Arc<RuleBook>>>,
    random: Arc<dyn RandomSource>,
}

impl BrainEngine {
    pub fn new(rules_dir: impl Into<PathBuf>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            book: RwLock::new(None),
            random,
        }
    }

    fn current(&self) -> Option<Arc<RuleBook>> {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn read_sources(&self) -> Result<Vec<(String, String)>, EngineError> {
        let io_error = |source: std::io::Error| EngineError::Io {
            path: self.rules_dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.rules_dir)
            .await
            .map_err(io_error)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RULE_EXTENSION) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(EngineError::NoRules(self.rules_dir.clone()));
        }
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| EngineError::Io {
                    path: path.clone(),
                    source,
                })?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            sources.push((name, text));
        }
        Ok(sources)
    }
}

/// Reject books that call subroutines the registry does not know
fn validate_calls(book: &RuleBook) -> Result<(), EngineError> {
    for (name, location) in book.called_subroutines() {
        if SubroutineKind::from_name(&name).is_none() {
            return Err(EngineError::UnknownSubroutine { name, location });
        }
    }
    Ok(())
}

#[async_trait]
impl DialogueEngine for BrainEngine {
    async fn reload(&self) -> Result<(), EngineError> {
        let sources = self.read_sources().await?;
        let book = RuleBook::parse(sources.iter().map(|(f, t)| (f.as_str(), t.as_str())))?;
        validate_calls(&book)?;

        tracing::info!(
            rules_dir = %self.rules_dir.display(),
            files = sources.len(),
            rules = book.rule_count(),
            "Loaded rules"
        );
        *self.book.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(book));
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    fn referenced_subroutines(&self) -> Vec<String> {
        let Some(book) = self.current() else {
            return Vec::new();
        };
        let mut names: Vec<String> = book
            .called_subroutines()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    async fn reply(
        &self,
        request: ReplyRequest<'_>,
        host: &dyn SubroutineHost,
    ) -> Result<EngineReply, EngineError> {
        let book = self.current().ok_or(EngineError::NotLoaded)?;

        let topic = if book.has_topic(request.topic) {
            request.topic
        } else {
            RANDOM_TOPIC
        };
        let message = normalize(request.text, false);

        let (rule, stars) = book
            .rules(topic)
            .unwrap_or_default()
            .iter()
            .find_map(|rule| rule.matches(&message).map(|stars| (rule, stars)))
            .ok_or(EngineError::NoReplyMatched)?;

        let template = &rule.replies[self.random.below(rule.replies.len())];
        tracing::debug!(
            thread_id = %request.thread_id,
            topic,
            trigger = %rule.trigger,
            "Matched rule"
        );

        let mut render = Render {
            vars: request.vars,
            local: HashMap::new(),
            assignments: Vec::new(),
            topic: topic.to_string(),
        };
        let text = render.expand(template, &stars);
        let text = unshield(&run_calls(&text, host).await?);

        Ok(EngineReply {
            text: text.trim().to_string(),
            topic: render.topic,
            assignments: render.assignments,
        })
    }
}

/// Tag expansion state for one reply
struct Render<'a> {
    vars: &'a HashMap<String, String>,
    local: HashMap<String, String>,
    assignments: Vec<(String, String)>,
    topic: String,
}

impl Render<'_> {
    fn expand(&mut self, template: &str, stars: &[String]) -> String {
        let text = STAR_RE.replace_all(template, |caps: &Captures| {
            let index = caps[1].parse::<usize>().unwrap_or(1).max(1);
            stars.get(index - 1).map(String::as_str).map(shield).unwrap_or_default()
        });

        let mut text = SET_RE
            .replace_all(&text, |caps: &Captures| {
                let name = caps[1].to_string();
                let value = unshield(caps[2].trim());
                self.local.insert(name.clone(), value.clone());
                self.assignments.push((name, value));
                String::new()
            })
            .into_owned();

        text = GET_RE
            .replace_all(&text, |caps: &Captures| {
                self.local
                    .get(&caps[1])
                    .or_else(|| self.vars.get(&caps[1]))
                    .map(String::as_str)
                    .map_or_else(|| "undefined".to_string(), shield)
            })
            .into_owned();

        TOPIC_RE
            .replace_all(&text, |caps: &Captures| {
                self.topic = caps[1].to_lowercase();
                String::new()
            })
            .into_owned()
    }
}

/// Run `<call>` tags in order, replacing each with its result
async fn run_calls(text: &str, host: &dyn SubroutineHost) -> Result<String, EngineError> {
    let calls: Vec<String> = CALL_RE
        .captures_iter(text)
        .map(|caps| unshield(&caps[1]))
        .collect();
    let literals: Vec<&str> = CALL_RE.split(text).collect();
    let mut literals = literals.into_iter();

    let mut output = String::with_capacity(text.len());
    output.push_str(literals.next().unwrap_or_default());
    for call in calls {
        let mut words = call.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<String> = words.map(str::to_string).collect();
        output.push_str(&host.call(name, args).await?);
        output.push_str(literals.next().unwrap_or_default());
    }
    Ok(output)
}
