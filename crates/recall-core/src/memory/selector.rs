//! Budget-constrained memory selection and long-horizon maintenance.
//!
//! [`MemorySelector`] packs ranked episodic memories into a token budget
//! with a per-topic diversity cap, evicts faded memories above a minimum
//! floor, and generalizes groups of old episodic memories into semantic ones.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use recall_types::config::SelectorConfig;
use recall_types::error::MemoryError;
use recall_types::memory::{
    EvictionReport, IndexFilter, MemoryProvenance, MemoryRecord, MemoryType, ScoredMemory,
    SemanticReport,
};
use recall_types::temporal::TemporalFilter;

use super::episodic::{AddOutcome, EpisodicStore, NewMemory};
use crate::llm::box_generator::BoxGenerator;
use crate::llm::json::{parse_model_json, preview};

/// Prefix of every record produced by [`MemorySelector::episodic_to_semantic`].
pub const SEMANTIC_PREFIX: &str = "[Semantic Knowledge]";

const DEFAULT_TOPIC: &str = "general";
const SEMANTIC_SAMPLE_MEMORIES: usize = 5;
const SEMANTIC_SAMPLE_CHARS: usize = 200;

/// Rough token cost of `content` (4 chars per token).
pub fn estimate_tokens(content: &str) -> usize {
    content.chars().count() / 4
}

/// Memories admitted under a token budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub memories: Vec<ScoredMemory>,
    pub tokens_used: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// One `- content` line per memory.
    pub fn render(&self) -> String {
        self.memories
            .iter()
            .map(|m| format!("- {}", m.record.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Greedy pack by descending score.
///
/// A candidate that does not fit the remaining budget is skipped and packing
/// continues. Once `max_per_topic` admitted memories share a topic, further
/// candidates carrying that topic are skipped.
pub fn greedy_pack(
    mut candidates: Vec<ScoredMemory>,
    budget_tokens: usize,
    max_per_topic: usize,
) -> Selection {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selection = Selection::default();
    let mut topic_counts: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let cost = estimate_tokens(&candidate.record.content);
        if selection.tokens_used + cost > budget_tokens {
            continue;
        }
        let saturated = candidate
            .record
            .topics
            .iter()
            .any(|t| topic_counts.get(t).copied().unwrap_or(0) >= max_per_topic);
        if saturated {
            continue;
        }

        for topic in &candidate.record.topics {
            *topic_counts.entry(topic.clone()).or_insert(0) += 1;
        }
        selection.tokens_used += cost;
        selection.memories.push(candidate);
    }
    selection
}

#[derive(Debug, Deserialize)]
struct SemanticDraft {
    #[serde(default)]
    knowledge: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

struct GroupOutcome {
    topic: String,
    source_count: usize,
    draft: Option<SemanticDraft>,
}

/// Selection, eviction and semantic consolidation over an [`EpisodicStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySelector {
    config: SelectorConfig,
}

impl MemorySelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Query `store` and pack the results into `budget_tokens`.
    #[tracing::instrument(name = "context_budget_select", skip(self, store, query, temporal))]
    pub async fn context_budget_select(
        &self,
        store: &EpisodicStore,
        query: &str,
        budget_tokens: usize,
        temporal: Option<&TemporalFilter>,
        now: DateTime<Utc>,
    ) -> Result<Selection, MemoryError> {
        let candidates = store
            .query(query, self.config.candidate_pool, None, temporal, now)
            .await?;
        let considered = candidates.len();
        let selection = greedy_pack(candidates, budget_tokens, self.config.max_similar_memories);
        tracing::debug!(
            candidates = considered,
            selected = selection.memories.len(),
            tokens = selection.tokens_used,
            "budget select"
        );
        Ok(selection)
    }

    /// Remove faded, rarely used memories without shrinking the store below
    /// `min_memories_keep`. The lowest decayed score goes first.
    #[tracing::instrument(name = "smart_eviction", skip(self, store, connections))]
    pub async fn smart_eviction<F>(
        &self,
        store: &EpisodicStore,
        connections: F,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<EvictionReport, MemoryError>
    where
        F: Fn(&MemoryRecord) -> u32 + Sync,
    {
        let total = store.count().await?;
        let filter = IndexFilter {
            exclude_preserved: true,
            ..Default::default()
        };
        let records = store
            .records(&filter, Some(self.config.eviction_page_size))
            .await?;

        let mut candidates: Vec<(f64, Uuid)> = records
            .iter()
            .filter(|r| {
                r.repetitions < self.config.eviction_max_repetitions
                    && r.access_count < self.config.eviction_max_access
                    && r.age_hours(now) > self.config.eviction_min_age_hours
            })
            .map(|r| (store.decay().for_record(r, connections(r), now), r.id))
            .filter(|(decayed, _)| *decayed < self.config.eviction_score_threshold)
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut report = EvictionReport {
            total,
            candidates: candidates.len(),
            dry_run,
            ..Default::default()
        };

        let max_evict = total.saturating_sub(self.config.min_memories_keep);
        let ids: Vec<Uuid> = candidates
            .iter()
            .take(max_evict)
            .map(|(_, id)| *id)
            .collect();

        if !dry_run && !ids.is_empty() {
            report.evicted = store.delete(&ids).await?;
        }
        report.evicted_ids = ids;

        tracing::info!(
            total,
            candidates = report.candidates,
            evicted = report.evicted,
            dry_run,
            "eviction pass"
        );
        Ok(report)
    }

    /// Generalize groups of old episodic memories into semantic memories.
    ///
    /// Eligible records (not semantic, old enough, repeated enough) are grouped
    /// by their first topic. Each group of two or more is summarized by
    /// `generator`, at most `llm_concurrency` at a time. Summaries above
    /// `semantic_confidence` are stored, or merged into an existing record
    /// when one is at least `semantic_dedup_threshold` similar.
    #[tracing::instrument(name = "episodic_to_semantic", skip(self, store, generator))]
    pub async fn episodic_to_semantic(
        &self,
        store: &EpisodicStore,
        generator: Arc<BoxGenerator>,
        now: DateTime<Utc>,
    ) -> Result<SemanticReport, MemoryError> {
        let min_age = Duration::days(self.config.semantic_threshold_days);
        let records = store.records(&IndexFilter::default(), None).await?;

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records {
            if record.memory_type == MemoryType::Semantic
                || now - record.created_at < min_age
                || record.repetitions < self.config.min_episodic_repetitions
            {
                continue;
            }
            let topic = record
                .topics
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
            groups.entry(topic).or_default().push(record.content);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.llm_concurrency.max(1)));
        let mut set: JoinSet<GroupOutcome> = JoinSet::new();
        for (topic, contents) in groups.into_iter().filter(|(_, c)| c.len() >= 2) {
            let generator = Arc::clone(&generator);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let source_count = contents.len();
                let draft = match semaphore.acquire_owned().await {
                    Ok(_permit) => summarize_group(&generator, &topic, &contents).await,
                    Err(_) => None,
                };
                GroupOutcome {
                    topic,
                    source_count,
                    draft,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(error = %e, "semantic extraction task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.topic.cmp(&b.topic));

        let mut report = SemanticReport {
            groups_considered: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            let Some(draft) = outcome
                .draft
                .filter(|d| d.confidence > self.config.semantic_confidence)
            else {
                report.skipped += 1;
                continue;
            };

            let existing = store
                .find_similar(&draft.knowledge, self.config.semantic_dedup_threshold, 1)
                .await?;
            if let Some(best) = existing.first() {
                store.bump_repetitions(&best.record, now).await?;
                tracing::info!(id = %best.record.id, score = best.score, "semantic knowledge merged");
                report.merged += 1;
                continue;
            }

            let memory = NewMemory::new(
                format!("{SEMANTIC_PREFIX} {}", draft.knowledge),
                MemoryType::Semantic,
            )
            .with_importance(self.config.semantic_importance)
            .with_topics(vec![outcome.topic.clone()])
            .with_provenance(MemoryProvenance::Semantic {
                source_count: outcome.source_count,
                topic: outcome.topic,
                confidence: draft.confidence,
            })
            .forced();
            match store.add(memory, now).await? {
                AddOutcome::Inserted(_) => report.created += 1,
                AddOutcome::Merged(_) => report.merged += 1,
                AddOutcome::Rejected => report.skipped += 1,
            }
        }

        tracing::info!(
            groups = report.groups_considered,
            created = report.created,
            merged = report.merged,
            skipped = report.skipped,
            "episodic to semantic finished"
        );
        Ok(report)
    }
}

async fn summarize_group(
    generator: &BoxGenerator,
    topic: &str,
    contents: &[String],
) -> Option<SemanticDraft> {
    let samples = contents
        .iter()
        .take(SEMANTIC_SAMPLE_MEMORIES)
        .map(|c| format!("- {}", c.chars().take(SEMANTIC_SAMPLE_CHARS).collect::<String>()))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "The following are several conversation records about the topic '{topic}'.\n\
         Extract the general knowledge or pattern they share.\n\n\
         ## Records:\n{samples}\n\n\
         ## Response format (JSON):\n\
         {{\"knowledge\": \"generalized knowledge in 1-2 sentences\", \"confidence\": 0.0-1.0}}"
    );

    let reply = match generator.generate(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, topic, "semantic extraction failed");
            return None;
        }
    };
    match parse_model_json::<SemanticDraft>(&reply) {
        Ok(draft) if !draft.knowledge.trim().is_empty() => Some(draft),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, topic, reply = %preview(&reply), "semantic reply was not valid JSON");
            None
        }
    }
}
