//! Promotion policy, content fingerprints and repetition counting.
//!
//! A candidate memory is reduced to a `content_key` (lowercased, particles
//! and articles removed, punctuation stripped, whitespace collapsed, first
//! 100 chars). The key is the dedup identity: at most one live record per key.

use std::collections::HashSet;
use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;

use recall_types::config::PromotionConfig;
use recall_types::memory::PromotionReason;

/// Korean particles, longest first so `으로` wins over `로`.
const KO_PARTICLES: &[&str] = &[
    "입니다", "이에요", "에서", "까지", "부터", "으로", "이다", "예요", "은", "는", "이", "가",
    "을", "를", "의", "에", "와", "과", "로", "도", "만", "뿐", "임",
];

const EN_ARTICLES: &[&str] = &["is", "the", "a", "an"];

static NON_WORD: LazyLock<Option<Regex>> = LazyLock::new(|| match Regex::new(r"[^\w\s]") {
    Ok(re) => Some(re),
    Err(e) => {
        tracing::warn!(error = %e, "content key pattern failed to compile");
        None
    }
});

/// Normalized dedup fingerprint of `content`, at most `max_chars` characters.
pub fn content_key(content: &str, max_chars: usize) -> String {
    let lowered = content.trim().to_lowercase().replace("'s", "");
    let stripped = match NON_WORD.as_ref() {
        Some(re) => re.replace_all(&lowered, "").into_owned(),
        None => lowered
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
            .collect(),
    };

    let tokens: Vec<&str> = stripped
        .split_whitespace()
        .filter(|t| !EN_ARTICLES.contains(t))
        .map(strip_particle)
        .filter(|t| !t.is_empty())
        .collect();

    tokens.join(" ").chars().take(max_chars).collect()
}

fn strip_particle(token: &str) -> &str {
    for particle in KO_PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if !stem.is_empty() {
                return stem;
            }
        }
    }
    token
}

/// Token-set Jaccard similarity in `[0, 1]` over lowercased words.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let left: HashSet<&str> = a_lower.split_whitespace().collect();
    let right: HashSet<&str> = b_lower.split_whitespace().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

// ---------------------------------------------------------------------------
// Promotion policy
// ---------------------------------------------------------------------------

/// Decides whether a candidate memory is persisted.
#[derive(Debug, Clone, Default)]
pub struct PromotionPolicy {
    config: PromotionConfig,
}

impl PromotionPolicy {
    pub fn new(config: PromotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Reason to promote, or `None` to reject.
    ///
    /// `repetitions` is the fingerprint count after this sighting was counted.
    pub fn evaluate(
        &self,
        repetitions: u32,
        importance: f64,
        force: bool,
    ) -> Option<PromotionReason> {
        if force {
            Some(PromotionReason::Forced)
        } else if importance >= self.config.min_importance {
            Some(PromotionReason::Importance)
        } else if repetitions >= self.config.min_repetitions.max(1) {
            Some(PromotionReason::Repetition)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Repetition counter
// ---------------------------------------------------------------------------

/// Concurrent per-fingerprint sighting counter.
#[derive(Debug, Default)]
pub struct RepetitionCounter {
    counts: DashMap<String, u32>,
}

impl RepetitionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more sighting and return the new total.
    pub fn increment(&self, key: &str) -> u32 {
        let mut entry = self.counts.entry(key.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }

    pub fn get(&self, key: &str) -> u32 {
        self.counts.get(key).map(|v| *v).unwrap_or(0)
    }

    /// Raise the stored count to at least `count`.
    pub fn seed(&self, key: &str, count: u32) {
        let mut entry = self.counts.entry(key.to_string()).or_insert(0);
        *entry = (*entry).max(count);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&self) {
        self.counts.clear();
    }
}
