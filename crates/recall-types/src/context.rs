//! Section budgets and assembly statistics for the context allocator.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Characters per token used for budget estimation.
pub const CHARS_PER_TOKEN: usize = 4;

/// What to do when a section exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    Truncate,
    Summarize,
    Drop,
}

impl fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowStrategy::Truncate => write!(f, "truncate"),
            OverflowStrategy::Summarize => write!(f, "summarize"),
            OverflowStrategy::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for OverflowStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "truncate" => Ok(OverflowStrategy::Truncate),
            "summarize" => Ok(OverflowStrategy::Summarize),
            "drop" => Ok(OverflowStrategy::Drop),
            other => Err(format!("invalid overflow strategy: '{other}'")),
        }
    }
}

/// Size limits and rendering rules for one named section of the prompt.
///
/// Budgets for a tier are fixed configuration and are never mutated while
/// a context is being assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionBudget {
    /// Lookup key (e.g. `working_memory`).
    pub name: String,
    /// Human-facing name substituted into the header template.
    #[serde(default)]
    pub display_name: Option<String>,
    pub max_chars: usize,
    /// Optional token ceiling; the tighter of this (x4) and `max_chars` applies.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Lower values are emitted first.
    pub priority: u32,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowStrategy,
    /// Header template; `{name}` is replaced by the display name.
    /// `None` emits the content without a header.
    #[serde(default = "default_header_template")]
    pub header_template: Option<String>,
}

fn default_overflow() -> OverflowStrategy {
    OverflowStrategy::Truncate
}

fn default_header_template() -> Option<String> {
    Some("## {name}".to_string())
}

impl SectionBudget {
    pub fn new(name: &str, max_chars: usize, priority: u32, overflow: OverflowStrategy) -> Self {
        Self {
            name: name.to_string(),
            display_name: None,
            max_chars,
            max_tokens: None,
            priority,
            overflow,
            header_template: default_header_template(),
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn without_header(mut self) -> Self {
        self.header_template = None;
        self
    }

    /// The effective character ceiling after applying the token limit.
    pub fn char_limit(&self) -> usize {
        match self.max_tokens {
            Some(tokens) => self.max_chars.min(tokens.saturating_mul(CHARS_PER_TOKEN)),
            None => self.max_chars,
        }
    }

    /// Rendered header, or `None` when the template is absent or empty.
    pub fn header(&self) -> Option<String> {
        let template = self.header_template.as_deref()?;
        if template.is_empty() {
            return None;
        }
        let display = self.display_name.as_deref().unwrap_or(&self.name);
        Some(template.replace("{name}", display))
    }
}

/// Per-build counters reported alongside the assembled context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub sections_added: usize,
    pub sections_truncated: usize,
    pub sections_summarized: usize,
    pub sections_dropped: usize,
    pub total_chars_raw: usize,
    pub total_chars_final: usize,
}
