//! Section budget allocator.
//!
//! `ContextOptimizer` collects named text sections, squeezes each one into its
//! configured budget (truncate, summarize, or drop), and renders the survivors
//! in priority order as a single bounded document.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use recall_types::config::{builtin_tier, EngineConfig, DEFAULT_TIER};
use recall_types::context::{ContextStats, OverflowStrategy, SectionBudget, CHARS_PER_TOKEN};

/// Appended to content cut by the truncate strategy.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Share of a summarized section reserved for the most recent turns.
const RECENT_SHARE: f64 = 0.85;

/// Older turns quoted in a summary digest.
const DIGEST_TURNS: usize = 5;

/// Characters kept from the first line of each quoted older turn.
const DIGEST_LINE_CHARS: usize = 100;

/// Length of the blank-line joiner between turns.
const TURN_SEPARATOR_LEN: usize = 2;

/// Budget used for section names the tier does not configure.
const FALLBACK_MAX_CHARS: usize = 2_000;
const FALLBACK_PRIORITY: u32 = 99;

const BULLET_MAX_CHARS: usize = 200;

/// Speaker labels and relative-time prefixes that start a new turn.
static TURN_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"\[(?:User|Assistant|user|assistant|System|system)\]:|\[\d+[분시간일]|\[\d+[smhd] ago|\[just now|\[\d{4}-\d{2}-\d{2}[\] |]",
    )
    .map_err(|e| tracing::warn!(error = %e, "Failed to compile turn marker pattern"))
    .ok()
});

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Builds one size-bounded prompt segment from prioritized sections.
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    tier: String,
    budgets: HashMap<String, SectionBudget>,
    sections: Vec<(SectionBudget, String)>,
    stats: ContextStats,
}

impl ContextOptimizer {
    /// Allocator for `tier`, resolved against user-defined tiers first and
    /// built-in tiers second. Unknown tiers fall back to the configured
    /// default tier, then to the built-in default.
    pub fn for_tier(tier: &str, config: &EngineConfig) -> Self {
        if let Some(budgets) = config.tier_budgets(tier) {
            return Self::with_budgets(tier, budgets);
        }

        tracing::warn!(tier, "Unknown budget tier, using default");
        let fallback = config.context.default_tier.as_str();
        match config.tier_budgets(fallback) {
            Some(budgets) => Self::with_budgets(fallback, budgets),
            None => Self::with_budgets(DEFAULT_TIER, builtin_tier(DEFAULT_TIER).unwrap_or_default()),
        }
    }

    /// Allocator over an explicit set of budgets.
    pub fn with_budgets(tier: &str, budgets: Vec<SectionBudget>) -> Self {
        Self {
            tier: tier.to_string(),
            budgets: budgets.into_iter().map(|b| (b.name.clone(), b)).collect(),
            sections: Vec::new(),
            stats: ContextStats::default(),
        }
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Add `content` under `name`, applying the section's overflow policy.
    ///
    /// Empty or whitespace-only content is ignored. Re-adding a name replaces
    /// the earlier content but keeps its position.
    pub fn add_section(&mut self, name: &str, content: &str) {
        if content.trim().is_empty() {
            return;
        }

        let budget = match self.budgets.get(name) {
            Some(b) => b.clone(),
            None => {
                tracing::warn!(section = name, "Unknown section, using default budget");
                SectionBudget::new(name, FALLBACK_MAX_CHARS, FALLBACK_PRIORITY, OverflowStrategy::Truncate)
                    .without_header()
            }
        };

        self.stats.sections_added += 1;
        self.stats.total_chars_raw += char_len(content);

        let processed = self.apply_budget(content, &budget);
        if processed.is_empty() {
            return;
        }
        self.stats.total_chars_final += char_len(&processed);

        match self.sections.iter_mut().find(|(b, _)| b.name == name) {
            Some(slot) => *slot = (budget, processed),
            None => self.sections.push((budget, processed)),
        }
    }

    fn apply_budget(&mut self, content: &str, budget: &SectionBudget) -> String {
        let limit = budget.char_limit();
        if limit == 0 {
            self.stats.sections_dropped += 1;
            return String::new();
        }

        if char_len(content) <= limit {
            return content.to_string();
        }

        match budget.overflow {
            OverflowStrategy::Truncate => {
                self.stats.sections_truncated += 1;
                Self::truncate(content, limit)
            }
            OverflowStrategy::Summarize => {
                self.stats.sections_summarized += 1;
                Self::summarize_overflow(content, limit)
            }
            OverflowStrategy::Drop => {
                self.stats.sections_dropped += 1;
                tracing::debug!(section = %budget.name, chars = char_len(content), "Section dropped due to size");
                String::new()
            }
        }
    }

    /// Cut `content` to at most `max_chars`, ending in [`TRUNCATION_MARKER`]
    /// whenever the marker itself fits.
    pub fn truncate(content: &str, max_chars: usize) -> String {
        if char_len(content) <= max_chars {
            return content.to_string();
        }

        let marker_len = char_len(TRUNCATION_MARKER);
        if max_chars <= marker_len {
            return take_chars(content, max_chars).to_string();
        }

        let kept = take_chars(content, max_chars - marker_len).trim_end();
        format!("{kept}{TRUNCATION_MARKER}")
    }

    /// Keep the most recent turns verbatim and digest the older ones.
    ///
    /// Falls back to [`Self::truncate`] when the content has three or fewer turns.
    fn summarize_overflow(content: &str, max_chars: usize) -> String {
        let turns = Self::split_turns(content);
        if turns.len() <= 3 {
            return Self::truncate(content, max_chars);
        }

        let recent_budget = (max_chars as f64 * RECENT_SHARE) as usize;

        let mut recent_chars = 0;
        let mut recent_count = 0;
        for turn in turns.iter().rev() {
            let separator = if recent_count == 0 { 0 } else { TURN_SEPARATOR_LEN };
            let cost = char_len(turn) + separator;
            if recent_chars + cost > recent_budget {
                break;
            }
            recent_chars += cost;
            recent_count += 1;
        }

        let split_at = turns.len() - recent_count;
        let (older, recent) = turns.split_at(split_at);
        let recent_text = recent.join("\n\n");

        if older.is_empty() {
            return recent_text;
        }

        let previews: Vec<&str> = older
            .iter()
            .take(DIGEST_TURNS)
            .filter_map(|t| t.lines().next())
            .map(|line| take_chars(line, DIGEST_LINE_CHARS))
            .filter(|line| !line.is_empty())
            .collect();

        let mut summary = format!(
            "[Earlier conversation summary: {} messages]\n  - {}",
            older.len(),
            previews.join("\n  - ")
        );

        // The digest gets whatever the recent turns left over.
        let summary_budget = if recent_text.is_empty() {
            max_chars
        } else {
            max_chars.saturating_sub(recent_chars + TURN_SEPARATOR_LEN)
        };
        if char_len(&summary) > summary_budget {
            let keep = summary_budget.saturating_sub(4);
            summary = format!("{}...]", take_chars(&summary, keep));
        }

        if recent_text.is_empty() {
            summary
        } else {
            format!("{summary}\n\n{recent_text}")
        }
    }

    /// Split conversation text into turns at speaker or relative-time markers.
    ///
    /// Text with no markers yields a single turn. Turns are trimmed and empty
    /// turns are discarded.
    pub fn split_turns(content: &str) -> Vec<String> {
        let mut bounds = vec![0];
        if let Some(re) = TURN_MARKER.as_ref() {
            bounds.extend(re.find_iter(content).map(|m| m.start()).filter(|&s| s > 0));
        }
        bounds.push(content.len());

        bounds
            .windows(2)
            .map(|w| content[w[0]..w[1]].trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Render all sections in ascending priority, each under its header.
    pub fn build(&self) -> String {
        if self.sections.is_empty() {
            return String::new();
        }

        let mut ordered: Vec<&(SectionBudget, String)> = self.sections.iter().collect();
        ordered.sort_by_key(|(budget, _)| budget.priority);

        let parts: Vec<String> = ordered
            .into_iter()
            .filter(|(_, content)| !content.trim().is_empty())
            .map(|(budget, content)| match budget.header() {
                Some(header) => format!("{header}\n{content}"),
                None => content.clone(),
            })
            .collect();

        let result = parts.join("\n\n");

        tracing::info!(
            tier = %self.tier,
            sections = self.stats.sections_added,
            truncated = self.stats.sections_truncated,
            summarized = self.stats.sections_summarized,
            dropped = self.stats.sections_dropped,
            raw_chars = self.stats.total_chars_raw,
            final_chars = self.stats.total_chars_final,
            tokens_approx = self.stats.total_chars_final / CHARS_PER_TOKEN,
            "Context optimized"
        );

        result
    }

    /// Consume the allocator, returning the rendered document and its stats.
    pub fn finish(self) -> (String, ContextStats) {
        let text = self.build();
        (text, self.stats)
    }

    /// Render up to `max_items` non-empty items as a bullet list.
    pub fn format_as_bullets(items: &[String], max_items: usize) -> String {
        let mut lines: Vec<String> = items
            .iter()
            .take(max_items)
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| {
                if char_len(item) > BULLET_MAX_CHARS {
                    format!("- {}...", take_chars(item, BULLET_MAX_CHARS - 3))
                } else {
                    format!("- {item}")
                }
            })
            .collect();

        if items.len() > max_items {
            lines.push(format!("- ... ({} more)", items.len() - max_items));
        }
        lines.join("\n")
    }
}

/// Rough token count using the 4-characters-per-token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text) / CHARS_PER_TOKEN
}
