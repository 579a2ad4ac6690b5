//! Long-term episodic memory backed by a vector index.
//!
//! # Write path
//! Candidate text is fingerprinted ([`content_key`]), counted, and run
//! through the [`PromotionPolicy`]. Accepted candidates are deduplicated
//! first by exact fingerprint, then by embedding similarity
//! (`duplicate_threshold`); a duplicate bumps the existing record's
//! repetitions instead of inserting a second row.
//!
//! # Read path
//! `score = similarity * decay_factor * importance_weight`, optionally
//! blended toward the temporal filter, plus `hot_boost` for memories the
//! [`AccessTracker`] has seen returned most often. Sorted descending.
//! Returned ids are handed to the tracker; the index is only written when
//! the tracker flushes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use recall_types::config::EngineConfig;
use recall_types::error::{MemoryError, RepositoryError};
use recall_types::memory::{
    ConsolidationReport, IndexFilter, MemoryProvenance, MemoryRecord, MemoryType, RecordPatch,
    ScoredMemory,
};
use recall_types::temporal::TemporalFilter;

use super::access::AccessTracker;
use super::box_embedder::BoxEmbedder;
use super::box_index::BoxVectorIndex;
use super::cache::{CacheStats, CachedEmbedder};
use super::decay::{DecayCalculator, DecayInputs};
use super::embedder::TaskType;
use super::promotion::{PromotionPolicy, RepetitionCounter, content_key, text_similarity};
use crate::temporal::boost_temporal_score;

/// Weight of the vector score in [`EpisodicStore::find_similar`]; the rest is text overlap.
const HYBRID_VECTOR_WEIGHT: f64 = 0.7;

/// Retrieval multiplier for a stored importance: 0.5 at importance 0, 1.0 at 1.
pub fn importance_weight(importance: f64) -> f64 {
    0.5 + 0.5 * importance.clamp(0.0, 1.0)
}

/// A candidate memory for [`EpisodicStore::add`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f64,
    pub source_session: Option<String>,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub topics: Vec<String>,
    /// Skip the promotion policy.
    pub force: bool,
    /// Let the engine's generator score importance before the write.
    pub score_importance: bool,
    /// Overrides the default episodic provenance.
    pub provenance: Option<MemoryProvenance>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            content: content.into(),
            memory_type,
            importance: 0.5,
            source_session: None,
            event_timestamp: None,
            topics: Vec::new(),
            force: false,
            score_importance: false,
            provenance: None,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self.score_importance = false;
        self
    }

    /// Ask the generator for an importance score; `importance` stays the
    /// fallback when no generator is configured.
    pub fn with_model_importance(mut self) -> Self {
        self.score_importance = true;
        self
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.source_session = Some(session_id.into());
        self
    }

    pub fn with_event_time(mut self, at: DateTime<Utc>) -> Self {
        self.event_timestamp = Some(at);
        self
    }

    pub fn with_provenance(mut self, provenance: MemoryProvenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new record was stored.
    Inserted(Uuid),
    /// The content matched an existing record, whose repetitions were bumped.
    Merged(Uuid),
    /// The promotion policy declined the candidate.
    Rejected,
}

impl AddOutcome {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            AddOutcome::Inserted(id) | AddOutcome::Merged(id) => Some(*id),
            AddOutcome::Rejected => None,
        }
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodicStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub preserved: usize,
    pub cached_repetitions: usize,
    pub pending_access_updates: usize,
    pub embedding_cache: CacheStats,
}

/// Vector-indexed long-term memory with promotion, dedup and decay.
pub struct EpisodicStore {
    index: BoxVectorIndex,
    embedder: CachedEmbedder,
    decay: DecayCalculator,
    policy: PromotionPolicy,
    repetitions: RepetitionCounter,
    access: AccessTracker,
    boost_factor: f64,
    hot_limit: usize,
    hot_boost: f64,
}

impl EpisodicStore {
    pub fn new(
        index: BoxVectorIndex,
        embedder: BoxEmbedder,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            embedder: CachedEmbedder::new(embedder, &config.embedding),
            decay: DecayCalculator::new(config.decay.clone()),
            policy: PromotionPolicy::new(config.promotion.clone()),
            repetitions: RepetitionCounter::new(),
            access: AccessTracker::new(config.access.clone(), now),
            boost_factor: config.context.temporal_boost_factor,
            hot_limit: config.access.hot_limit,
            hot_boost: config.access.hot_boost,
        }
    }

    pub fn index(&self) -> &BoxVectorIndex {
        &self.index
    }

    pub fn decay(&self) -> &DecayCalculator {
        &self.decay
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    pub fn access_tracker(&self) -> &AccessTracker {
        &self.access
    }

    pub fn embedding_cache(&self) -> &CachedEmbedder {
        &self.embedder
    }

    /// Seed the repetition counter from stored records so a restart does not
    /// reset everyone to their first sighting. Returns the number of keys seeded.
    #[tracing::instrument(name = "warm_repetition_cache", skip(self))]
    pub async fn warm_repetition_cache(&self) -> Result<usize, RepositoryError> {
        let records = self.index.get(&IndexFilter::default(), None).await?;
        for record in &records {
            self.repetitions
                .seed(&record.content_key, record.repetitions.max(1));
        }
        tracing::debug!(keys = self.repetitions.len(), "repetition cache warmed");
        Ok(self.repetitions.len())
    }

    /// Promote `memory` into long-term storage.
    ///
    /// Provider failures abort the write and are returned; nothing is stored.
    #[tracing::instrument(
        name = "episodic_add",
        skip(self, memory),
        fields(memory_type = %memory.memory_type, importance = memory.importance)
    )]
    pub async fn add(&self, memory: NewMemory, now: DateTime<Utc>) -> Result<AddOutcome, MemoryError> {
        let max_chars = self.policy.config().content_key_max_chars;
        let key = content_key(&memory.content, max_chars);
        if key.is_empty() {
            tracing::debug!("empty content rejected");
            return Ok(AddOutcome::Rejected);
        }

        let repetitions = self.repetitions.increment(&key);
        let Some(reason) = self
            .policy
            .evaluate(repetitions, memory.importance, memory.force)
        else {
            tracing::debug!(repetitions, "memory rejected by promotion policy");
            return Ok(AddOutcome::Rejected);
        };

        if let Some(existing) = self
            .index
            .get(&IndexFilter::by_content_key(key.clone()), Some(1))
            .await?
            .into_iter()
            .next()
        {
            self.merge_into(&existing, &key, repetitions, now).await?;
            return Ok(AddOutcome::Merged(existing.id));
        }

        let vector = self
            .embedder
            .embed(&memory.content, TaskType::RetrievalDocument)
            .await?;

        let duplicate_threshold = self.policy.config().duplicate_threshold;
        if let Some(hit) = self
            .index
            .query(&vector, 1, &IndexFilter::default())
            .await?
            .into_iter()
            .next()
            .filter(|hit| hit.similarity >= duplicate_threshold)
        {
            tracing::debug!(similarity = hit.similarity, id = %hit.record.id, "near-duplicate merged");
            self.merge_into(&hit.record, &key, repetitions, now).await?;
            return Ok(AddOutcome::Merged(hit.record.id));
        }

        let provenance = memory.provenance.unwrap_or(MemoryProvenance::Episodic {
            source_session: memory.source_session,
            promotion_reason: reason,
        });
        let record = MemoryRecord {
            id: Uuid::now_v7(),
            content: memory.content,
            memory_type: memory.memory_type,
            importance: memory.importance.clamp(0.0, 1.0),
            repetitions,
            access_count: 0,
            created_at: now,
            last_accessed: now,
            event_timestamp: Some(memory.event_timestamp.unwrap_or(now)),
            content_key: key,
            preserved: false,
            topics: memory.topics,
            provenance,
        };
        self.index.add(&record, &vector).await?;
        tracing::info!(id = %record.id, reason = %reason, chars = record.content.len(), "memory stored");
        Ok(AddOutcome::Inserted(record.id))
    }

    async fn merge_into(
        &self,
        existing: &MemoryRecord,
        key: &str,
        seen: u32,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let repetitions = seen.max(existing.repetitions.saturating_add(1));
        self.repetitions.seed(key, repetitions);
        self.index
            .update(
                &existing.id,
                &RecordPatch {
                    repetitions: Some(repetitions),
                    last_accessed: Some(now),
                    ..Default::default()
                },
            )
            .await
    }

    /// Increase a record's repetition count by one and touch it.
    pub async fn bump_repetitions(
        &self,
        record: &MemoryRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.merge_into(record, &record.content_key, 0, now).await
    }

    /// Rank stored memories against `text`.
    #[tracing::instrument(
        name = "episodic_query",
        skip(self, text, temporal),
        fields(query_len = text.len(), temporal = temporal.is_some())
    )]
    pub async fn query(
        &self,
        text: &str,
        n: usize,
        memory_type: Option<MemoryType>,
        temporal: Option<&TemporalFilter>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(text, TaskType::RetrievalQuery).await?;

        let filter = IndexFilter {
            memory_type,
            date_from: temporal.map(|f| f.start()),
            date_before: temporal.map(|f| f.end_exclusive()),
            ..Default::default()
        };
        let fetch = (n + 5).max((n as f64 * 1.5).ceil() as usize);
        let hits = self.index.query(&vector, fetch, &filter).await?;
        let hot = self.access.hot_ids(self.hot_limit);

        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .map(|hit| {
                let event_time = hit.record.event_timestamp.unwrap_or(hit.record.created_at);
                let age_hours = (now - event_time).num_seconds().max(0) as f64 / 3600.0;
                let decay_factor = self.decay.decay(&DecayInputs {
                    access_count: hit.record.access_count,
                    ..DecayInputs::new(1.0, age_hours)
                });
                let base =
                    hit.similarity * decay_factor * importance_weight(hit.record.importance);
                let mut score = boost_temporal_score(
                    base,
                    Some(hit.record.memory_date()),
                    temporal,
                    self.boost_factor,
                );
                if hot.contains(&hit.record.id) {
                    score += self.hot_boost;
                }
                ScoredMemory {
                    record: hit.record,
                    similarity: hit.similarity,
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(n);

        self.access.record(
            scored.iter().map(|m| (m.record.id, m.record.access_count)),
            now,
        );
        tracing::debug!(results = scored.len(), "episodic query done");
        Ok(scored)
    }

    /// Hybrid lookup: `0.7 * vector + 0.3 * word overlap`, at least `threshold`.
    pub async fn find_similar(
        &self,
        content: &str,
        threshold: f64,
        n: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed(content, TaskType::RetrievalQuery)
            .await?;
        let hits = self
            .index
            .query(&vector, n * 2, &IndexFilter::default())
            .await?;

        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .map(|hit| {
                let text = text_similarity(content, &hit.record.content);
                let score =
                    HYBRID_VECTOR_WEIGHT * hit.similarity + (1.0 - HYBRID_VECTOR_WEIGHT) * text;
                ScoredMemory {
                    record: hit.record,
                    similarity: hit.similarity,
                    score,
                }
            })
            .filter(|m| m.score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(n);
        Ok(scored)
    }

    /// Batch decay pass.
    ///
    /// Unpreserved records reaching `preserve_repetitions` become preserved.
    /// The rest are deleted when their decayed importance is below
    /// `delete_threshold` and they are rarely repeated and rarely read;
    /// survivors have their importance rewritten to the decayed value.
    /// `connections` reports knowledge-graph connections for a record.
    #[tracing::instrument(name = "episodic_consolidate", skip(self, connections))]
    pub async fn consolidate<F>(
        &self,
        connections: F,
        now: DateTime<Utc>,
    ) -> Result<ConsolidationReport, MemoryError>
    where
        F: Fn(&MemoryRecord) -> u32 + Sync,
    {
        if let Err(e) = self.access.flush(&self.index, now).await {
            tracing::warn!(error = %e, "access flush before consolidation failed");
        }

        let config = self.policy.config();
        let records = self.index.get(&IndexFilter::default(), None).await?;
        let mut report = ConsolidationReport {
            checked: records.len(),
            ..Default::default()
        };

        let mut preserve = Vec::new();
        let mut delete = Vec::new();
        let mut survivors = Vec::new();
        for record in &records {
            if record.preserved {
                continue;
            }
            if record.repetitions >= config.preserve_repetitions {
                preserve.push((
                    record.id,
                    RecordPatch {
                        preserved: Some(true),
                        ..Default::default()
                    },
                ));
                continue;
            }
            let decayed = self.decay.for_record(record, connections(record), now);
            if decayed < config.delete_threshold
                && record.repetitions < config.eviction_max_repetitions
                && record.access_count < config.eviction_max_access
            {
                delete.push(record.id);
            } else {
                survivors.push((
                    record.id,
                    RecordPatch {
                        importance: Some(decayed),
                        ..Default::default()
                    },
                ));
            }
        }

        if !preserve.is_empty() {
            report.preserved = self.index.batch_update(&preserve).await?;
        }
        if !delete.is_empty() {
            report.deleted = self.index.delete(&delete).await?;
            self.access.forget(&delete);
        }
        if !survivors.is_empty() {
            report.surviving_updated = self.index.batch_update(&survivors).await?;
        }

        tracing::info!(
            checked = report.checked,
            deleted = report.deleted,
            preserved = report.preserved,
            surviving_updated = report.surviving_updated,
            "consolidation finished"
        );
        Ok(report)
    }

    /// Flush pending access updates unconditionally.
    pub async fn flush_access(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.access.flush(&self.index, now).await
    }

    /// Flush pending access updates if a threshold was crossed.
    pub async fn maybe_flush_access(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.access.maybe_flush(&self.index, now).await
    }

    pub async fn count(&self) -> Result<usize, RepositoryError> {
        self.index.count().await
    }

    pub async fn records(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.index.get(filter, limit).await
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        let deleted = self.index.delete(ids).await?;
        self.access.forget(ids);
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<EpisodicStats, RepositoryError> {
        let records = self.index.get(&IndexFilter::default(), None).await?;
        let mut by_type = BTreeMap::new();
        for record in &records {
            *by_type.entry(record.memory_type.to_string()).or_insert(0) += 1;
        }
        Ok(EpisodicStats {
            total: records.len(),
            preserved: records.iter().filter(|r| r.preserved).count(),
            by_type,
            cached_repetitions: self.repetitions.len(),
            pending_access_updates: self.access.pending_count(),
            embedding_cache: self.embedder.stats(),
        })
    }
}
