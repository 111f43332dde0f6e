//! Profanity detection for the language policing branch

use regex::Regex;
use std::sync::LazyLock;

const WORDS: &[&str] = &[
    r"fuck\w*",
    r"motherfuck\w*",
    r"shit\w*",
    r"bullshit\w*",
    r"bitch\w*",
    r"bastard\w*",
    r"asshole\w*",
    r"dickhead\w*",
    r"cunt\w*",
    r"wank\w*",
    r"bollocks",
    r"piss(?:ed|ing)?",
    r"crap(?:py)?",
    r"damn(?:ed|it)?",
];

static DEFAULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build(WORDS.iter().copied()).expect("valid profanity pattern"));

fn build<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Regex, regex::Error> {
    let alternatives = words.into_iter().collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b"))
}

/// Whole-word profanity matcher
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    pattern: Regex,
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
        }
    }
}

impl ProfanityFilter {
    /// Filter over a custom word list. Each entry is a regex fragment.
    pub fn with_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: build(words)?,
        })
    }

    pub fn is_profane(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}
