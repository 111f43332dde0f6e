//! Rule file parser
//!
//! Reads the `.rive`-style rule format into a sorted [`RuleBook`].

use super::EngineError;
use crate::state_machine::RANDOM_TOPIC;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static CALL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<call>\s*([^\s<]+)").expect("valid call regex"));

/// One trigger and its candidate replies
#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger: String,
    pattern: Regex,
    literal_words: usize,
    wildcards: usize,
    pub replies: Vec<String>,
    /// `file:line` of the trigger
    pub location: String,
}

impl Rule {
    fn compile(trigger: &str, location: String) -> Result<Self, String> {
        let normalized = normalize(trigger, true);
        if normalized.is_empty() {
            return Err("empty trigger".to_string());
        }

        let mut parts = Vec::new();
        let mut literal_words = 0;
        let mut wildcards = 0;
        for word in normalized.split(' ') {
            if word == "*" {
                wildcards += 1;
                parts.push("(.+?)".to_string());
            } else if word.contains('*') {
                return Err(format!("wildcard must be a whole word in `{trigger}`"));
            } else {
                literal_words += 1;
                parts.push(regex::escape(word));
            }
        }

        let pattern = Regex::new(&format!("^{}$", parts.join(" ")))
            .map_err(|e| format!("invalid trigger `{trigger}`: {e}"))?;

        Ok(Self {
            trigger: normalized,
            pattern,
            literal_words,
            wildcards,
            replies: Vec::new(),
            location,
        })
    }

    /// Wildcard captures if the normalized message matches
    pub fn matches(&self, message: &str) -> Option<Vec<String>> {
        let captures = self.pattern.captures(message)?;
        Some(
            captures
                .iter()
                .skip(1)
                .map(|c| c.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

/// Lowercase, drop punctuation and collapse whitespace.
///
/// Triggers keep `*`; messages never contain it after normalization.
pub fn normalize(text: &str, keep_wildcards: bool) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || (keep_wildcards && *c == '*'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parsed rule corpus, rules sorted most specific first within each topic
#[derive(Debug, Default)]
pub struct RuleBook {
    topics: HashMap<String, Vec<Rule>>,
}

impl RuleBook {
    /// Parse `(file name, contents)` pairs in order
    pub fn parse<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, EngineError> {
        let mut book = RuleBook::default();
        for (file, text) in sources {
            parse_file(&mut book, file, text)?;
        }
        for rules in book.topics.values_mut() {
            rules.sort_by(|a, b| {
                b.literal_words
                    .cmp(&a.literal_words)
                    .then(a.wildcards.cmp(&b.wildcards))
                    .then(b.trigger.len().cmp(&a.trigger.len()))
            });
        }
        Ok(book)
    }

    pub fn rules(&self, topic: &str) -> Option<&[Rule]> {
        self.topics.get(topic).map(Vec::as_slice)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn rule_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Every `<call>` name referenced by a reply, with its rule location
    pub fn called_subroutines(&self) -> Vec<(String, String)> {
        let mut calls = Vec::new();
        for rules in self.topics.values() {
            for rule in rules {
                for reply in &rule.replies {
                    for captures in CALL_NAME_RE.captures_iter(reply) {
                        calls.push((captures[1].to_string(), rule.location.clone()));
                    }
                }
            }
        }
        calls
    }
}

struct Draft {
    rule: Rule,
    line: usize,
}

fn parse_file(book: &mut RuleBook, file: &str, text: &str) -> Result<(), EngineError> {
    let error = |line: usize, message: String| EngineError::Parse {
        file: file.to_string(),
        line,
        message,
    };

    let mut topic = RANDOM_TOPIC.to_string();
    let mut draft: Option<Draft> = None;

    let finish = |book: &mut RuleBook, draft: Option<Draft>, topic: &str| {
        if let Some(Draft { rule, line }) = draft {
            if rule.replies.is_empty() {
                return Err(error(line, format!("trigger `{}` has no reply", rule.trigger)));
            }
            book.topics.entry(topic.to_string()).or_default().push(rule);
        }
        Ok(())
    };

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let mut chars = line.chars();
        let Some(command) = chars.next() else {
            continue;
        };
        let rest = chars.as_str().trim();
        match command {
            '!' => {}
            '+' => {
                finish(book, draft.take(), &topic)?;
                let rule = Rule::compile(rest, format!("{file}:{line_no}"))
                    .map_err(|message| error(line_no, message))?;
                draft = Some(Draft { rule, line: line_no });
            }
            '-' => match draft.as_mut() {
                Some(d) => d.rule.replies.push(rest.to_string()),
                None => return Err(error(line_no, "reply without a trigger".to_string())),
            },
            '^' => match draft.as_mut().and_then(|d| d.rule.replies.last_mut()) {
                Some(reply) => {
                    reply.push(' ');
                    reply.push_str(rest);
                }
                None => return Err(error(line_no, "continuation without a reply".to_string())),
            },
            '>' => {
                finish(book, draft.take(), &topic)?;
                let mut words = rest.split_whitespace();
                match (words.next(), words.next()) {
                    (Some("topic"), Some(name)) => topic = name.to_lowercase(),
                    _ => return Err(error(line_no, format!("unsupported block `{rest}`"))),
                }
            }
            '<' => {
                finish(book, draft.take(), &topic)?;
                topic = RANDOM_TOPIC.to_string();
            }
            other => return Err(error(line_no, format!("unknown command `{other}`"))),
        }
    }

    finish(book, draft.take(), &topic)
}
