//! Engine configuration types for recall.
//!
//! `EngineConfig` is the top-level `config.toml`: decay constants, promotion
//! and similarity thresholds, selector limits, graph limits, and per-tier
//! section budgets. Every field has a default, so an empty file is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::{OverflowStrategy, SectionBudget};
use crate::memory::MemoryType;

/// Name of the built-in full-size tier.
pub const DEFAULT_TIER: &str = "axel";

/// Name of the built-in reduced tier.
pub const COMPACT_TIER: &str = "compact";

/// Top-level configuration for the memory engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub working: WorkingConfig,
    #[serde(default)]
    pub access: AccessFlushConfig,
    #[serde(default)]
    pub embedding: EmbeddingCacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub context: ContextConfig,
    /// User-defined tiers. A tier here shadows a built-in tier of the same name.
    #[serde(default)]
    pub tiers: BTreeMap<String, Vec<SectionBudget>>,
}

impl EngineConfig {
    /// Section budgets for `tier`, or `None` when no such tier exists.
    pub fn tier_budgets(&self, tier: &str) -> Option<Vec<SectionBudget>> {
        self.tiers.get(tier).cloned().or_else(|| builtin_tier(tier))
    }
}

// ---------------------------------------------------------------------------
// Decay
// ---------------------------------------------------------------------------

/// Constants for the adaptive forgetting curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub base_rate: f64,
    /// k1 in `stability = 1 + k1 * ln(1 + access_count)`.
    pub access_stability_k: f64,
    /// k2 in `resistance = min(1, connections * k2)`.
    pub relation_resistance_k: f64,
    /// Floor as a fraction of the original importance.
    pub min_retention: f64,
    pub recency_age_hours: f64,
    pub recency_access_hours: f64,
    pub recency_boost: f64,
    pub type_multipliers: TypeMultipliers,
    /// Hours of day (0-23) when the user is usually active. Accesses that
    /// happened in these hours count as one extra access for stability.
    pub peak_hours: Vec<u32>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            base_rate: 0.005,
            access_stability_k: 0.3,
            relation_resistance_k: 0.1,
            min_retention: 0.1,
            recency_age_hours: 168.0,
            recency_access_hours: 24.0,
            recency_boost: 1.3,
            type_multipliers: TypeMultipliers::default(),
            peak_hours: Vec::new(),
        }
    }
}

/// Per-type decay speed. Lower is slower.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeMultipliers {
    pub fact: f64,
    pub preference: f64,
    pub insight: f64,
    pub conversation: f64,
    pub semantic: f64,
}

impl Default for TypeMultipliers {
    fn default() -> Self {
        Self {
            fact: 0.3,
            preference: 0.5,
            insight: 0.7,
            conversation: 1.0,
            semantic: 0.3,
        }
    }
}

impl TypeMultipliers {
    pub fn for_type(&self, memory_type: Option<MemoryType>) -> f64 {
        match memory_type {
            Some(MemoryType::Fact) => self.fact,
            Some(MemoryType::Preference) => self.preference,
            Some(MemoryType::Insight) => self.insight,
            Some(MemoryType::Semantic) => self.semantic,
            Some(MemoryType::Conversation) | None => self.conversation,
        }
    }
}

// ---------------------------------------------------------------------------
// Promotion / consolidation
// ---------------------------------------------------------------------------

/// Thresholds for accepting, deduplicating, and consolidating memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_importance: f64,
    /// A fingerprint seen at least this many times is promoted.
    pub min_repetitions: u32,
    /// Cosine similarity at or above which a write merges into an existing record.
    pub duplicate_threshold: f64,
    /// Decayed importance below which an unpreserved record may be deleted.
    pub delete_threshold: f64,
    /// Repetitions at which a record becomes permanently preserved.
    pub preserve_repetitions: u32,
    /// Deletion requires `repetitions < eviction_max_repetitions`.
    pub eviction_max_repetitions: u32,
    /// Deletion requires `access_count < eviction_max_access`.
    pub eviction_max_access: u32,
    pub content_key_max_chars: usize,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_importance: 0.25,
            min_repetitions: 1,
            duplicate_threshold: 0.90,
            delete_threshold: 0.1,
            preserve_repetitions: 3,
            eviction_max_repetitions: 2,
            eviction_max_access: 3,
            content_key_max_chars: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Limits for budget selection, eviction, and semantic consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Topic diversity cap.
    pub max_similar_memories: usize,
    pub candidate_pool: usize,
    pub eviction_score_threshold: f64,
    /// Eviction never shrinks the store below this many records.
    pub min_memories_keep: usize,
    pub eviction_min_age_hours: f64,
    pub eviction_max_repetitions: u32,
    pub eviction_max_access: u32,
    pub eviction_page_size: usize,
    pub semantic_threshold_days: i64,
    pub min_episodic_repetitions: u32,
    pub llm_concurrency: usize,
    pub semantic_confidence: f64,
    pub semantic_dedup_threshold: f64,
    pub semantic_importance: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_similar_memories: 2,
            candidate_pool: 30,
            eviction_score_threshold: 0.1,
            min_memories_keep: 3,
            eviction_min_age_hours: 168.0,
            eviction_max_repetitions: 3,
            eviction_max_access: 3,
            eviction_page_size: 200,
            semantic_threshold_days: 5,
            min_episodic_repetitions: 1,
            llm_concurrency: 3,
            semantic_confidence: 0.5,
            semantic_dedup_threshold: 0.92,
            semantic_importance: 0.8,
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Limits for graph extraction, querying, and rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Extracted entities below this importance are dropped.
    pub importance_threshold: f64,
    pub max_entities: usize,
    pub max_depth: usize,
    pub max_relations: usize,
    pub max_paths: usize,
    pub max_query_entities: usize,
    pub max_format_entities: usize,
    pub max_format_relations: usize,
    pub prune: GraphPruneConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            importance_threshold: 0.6,
            max_entities: 5,
            max_depth: 2,
            max_relations: 10,
            max_paths: 5,
            max_query_entities: 3,
            max_format_entities: 5,
            max_format_relations: 5,
            prune: GraphPruneConfig::default(),
        }
    }
}

/// Optional graph-level eviction. Disabled by default (unbounded growth).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphPruneConfig {
    pub enabled: bool,
    /// Entities mentioned fewer times than this are prune candidates.
    pub min_mentions: u32,
    /// Candidates must also be idle for at least this many days.
    pub max_idle_days: i64,
}

impl Default for GraphPruneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_mentions: 2,
            max_idle_days: 90,
        }
    }
}

// ---------------------------------------------------------------------------
// Working buffer / access tracking / embedding cache / retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingConfig {
    /// Buffer holds `max_turns * 2` messages.
    pub max_turns: usize,
    /// Turns kept verbatim by the progressive view.
    pub full_turns: usize,
    pub user_compress_chars: usize,
    pub assistant_compress_chars: usize,
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            full_turns: 6,
            user_compress_chars: 500,
            assistant_compress_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessFlushConfig {
    /// Flush once this many ids are pending.
    pub threshold: usize,
    /// Flush once this many seconds have passed since the last flush.
    pub interval_secs: u64,
    /// Most-read memories that count as hot during retrieval.
    pub hot_limit: usize,
    /// Added to the retrieval score of a hot memory.
    pub hot_boost: f64,
}

impl Default for AccessFlushConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            interval_secs: 300,
            hot_limit: 20,
            hot_boost: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingCacheConfig {
    pub capacity: usize,
    /// Only this many leading characters participate in the cache key.
    pub key_prefix_chars: usize,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            key_prefix_chars: 500,
        }
    }
}

/// Retry policy for embedding and generation calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fractional jitter applied to each delay (0.25 = +/-25%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// Context assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_tier")]
    pub default_tier: String,
    /// Token budget for the long-term memory section.
    #[serde(default = "default_long_term_budget_tokens")]
    pub long_term_budget_tokens: usize,
    #[serde(default = "default_session_archive_budget_chars")]
    pub session_archive_budget_chars: usize,
    #[serde(default = "default_session_archive_limit")]
    pub session_archive_limit: usize,
    /// Blend factor for temporal score boosting.
    #[serde(default = "default_temporal_boost_factor")]
    pub temporal_boost_factor: f64,
    /// Entities from the graph lookup appended to the long-term query.
    #[serde(default = "default_enrich_entities")]
    pub enrich_entities: usize,
}

fn default_tier() -> String {
    DEFAULT_TIER.to_string()
}

fn default_long_term_budget_tokens() -> usize {
    30_000 / 4
}

fn default_session_archive_budget_chars() -> usize {
    3_000
}

fn default_session_archive_limit() -> usize {
    10
}

fn default_temporal_boost_factor() -> f64 {
    0.4
}

fn default_enrich_entities() -> usize {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
            long_term_budget_tokens: default_long_term_budget_tokens(),
            session_archive_budget_chars: default_session_archive_budget_chars(),
            session_archive_limit: default_session_archive_limit(),
            temporal_boost_factor: default_temporal_boost_factor(),
            enrich_entities: default_enrich_entities(),
        }
    }
}

/// Budgets of a built-in tier.
pub fn builtin_tier(name: &str) -> Option<Vec<SectionBudget>> {
    match name {
        DEFAULT_TIER => Some(full_tier(1)),
        COMPACT_TIER => {
            let mut budgets = full_tier(10);
            for b in budgets.iter_mut().filter(|b| b.name == "working_memory") {
                b.max_tokens = Some(2_000);
            }
            Some(budgets)
        }
        _ => None,
    }
}

fn full_tier(divisor: usize) -> Vec<SectionBudget> {
    use OverflowStrategy::{Summarize, Truncate};
    vec![
        SectionBudget::new("system_prompt", 30_000 / divisor, 1, Truncate).without_header(),
        SectionBudget::new("temporal", 10_000 / divisor, 2, Truncate)
            .with_display_name("Conversation Context"),
        SectionBudget::new("working_memory", 800_000 / divisor, 3, Summarize)
            .with_display_name("Current Conversation"),
        SectionBudget::new("session_archive", 300_000 / divisor, 4, Truncate)
            .with_display_name("Session History"),
        SectionBudget::new("long_term", 500_000 / divisor, 5, Truncate)
            .with_display_name("Long-term Memory"),
        SectionBudget::new("graphrag", 200_000 / divisor, 6, Truncate)
            .with_display_name("Relational Knowledge"),
    ]
}
