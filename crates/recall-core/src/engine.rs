//! Engine facade: owns every memory component and assembles the per-turn
//! context document.
//!
//! All collaborators (embedder, generator, vector index, document stores,
//! session archive) are injected through [`EngineParts`]; nothing is global.
//! Background work scheduled by a turn runs under the engine's
//! [`TaskSupervisor`] and never fails the turn that scheduled it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use recall_types::config::EngineConfig;
use recall_types::context::ContextStats;
use recall_types::error::MemoryError;
use recall_types::graph::{Entity, GraphDocument, GraphStats};
use recall_types::memory::{ConsolidationReport, EvictionReport, SemanticReport};
use recall_types::session::SessionSummary;
use recall_types::temporal::TemporalFilter;
use recall_types::working::{Role, WorkingSnapshot};

use crate::context::ContextOptimizer;
use crate::graph::rag::GraphRag;
use crate::llm::box_generator::BoxGenerator;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::box_index::BoxVectorIndex;
use crate::memory::episodic::{AddOutcome, EpisodicStats, EpisodicStore, NewMemory};
use crate::memory::importance::score_importance;
use crate::memory::selector::MemorySelector;
use crate::runtime::supervisor::TaskSupervisor;
use crate::storage::archive::BoxSessionArchive;
use crate::storage::box_document::BoxDocumentStore;
use crate::temporal::TemporalParser;
use crate::working::{FIRST_CONVERSATION, WorkingBuffer, relative_time};

pub const SECTION_SYSTEM_PROMPT: &str = "system_prompt";
pub const SECTION_TEMPORAL: &str = "temporal";
pub const SECTION_WORKING: &str = "working_memory";
pub const SECTION_ARCHIVE: &str = "session_archive";
pub const SECTION_LONG_TERM: &str = "long_term";
pub const SECTION_GRAPH: &str = "graphrag";

/// Bullets kept when a finished session is condensed for the archive.
const SESSION_DIGEST_ITEMS: usize = 20;

/// User turns shorter than this are not sent for entity extraction.
const MIN_EXTRACTION_CHARS: usize = 20;

/// Externally provided collaborators.
pub struct EngineParts {
    pub index: BoxVectorIndex,
    pub embedder: BoxEmbedder,
    /// Optional; without one, graph extraction is rule-based only and
    /// semantic consolidation and importance scoring are skipped.
    pub generator: Option<BoxGenerator>,
    pub graph_store: BoxDocumentStore<GraphDocument>,
    pub working_store: BoxDocumentStore<WorkingSnapshot>,
    pub archive: BoxSessionArchive,
}

/// Result of [`ContextEngine::consolidate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceReport {
    pub episodic: ConsolidationReport,
    /// `None` when no generator is configured.
    pub semantic: Option<SemanticReport>,
    pub graph_weights_changed: usize,
}

/// Point-in-time view across all stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub session_id: String,
    pub working_messages: usize,
    pub turn_count: usize,
    pub episodic: EpisodicStats,
    pub graph: GraphStats,
    pub background_tasks: usize,
}

/// The memory and context-assembly engine.
pub struct ContextEngine {
    config: EngineConfig,
    episodic: Arc<EpisodicStore>,
    selector: MemorySelector,
    graph: Arc<GraphRag>,
    working: Mutex<WorkingBuffer>,
    working_store: BoxDocumentStore<WorkingSnapshot>,
    archive: BoxSessionArchive,
    generator: Option<Arc<BoxGenerator>>,
    supervisor: TaskSupervisor,
}

impl ContextEngine {
    /// Assemble the engine, restoring the graph and working buffer from their
    /// stores. Unreadable persisted state degrades to empty.
    #[tracing::instrument(name = "engine_open", skip_all)]
    pub async fn open(parts: EngineParts, config: EngineConfig, now: DateTime<Utc>) -> Self {
        let generator = parts.generator.map(Arc::new);
        let graph = GraphRag::load(parts.graph_store, generator.clone(), config.graph.clone()).await;
        let working = WorkingBuffer::load(config.working.clone(), &parts.working_store, now).await;
        let episodic = EpisodicStore::new(parts.index, parts.embedder, &config, now);

        match episodic.warm_repetition_cache().await {
            Ok(seeded) => tracing::debug!(seeded, "repetition cache warmed"),
            Err(e) => tracing::warn!(error = %e, "failed to warm repetition cache"),
        }

        tracing::info!(
            graph_entities = graph.stats().total_entities,
            working_messages = working.len(),
            generator = generator.is_some(),
            "context engine ready"
        );

        Self {
            selector: MemorySelector::new(config.selector.clone()),
            episodic: Arc::new(episodic),
            graph: Arc::new(graph),
            working: Mutex::new(working),
            working_store: parts.working_store,
            archive: parts.archive,
            generator,
            supervisor: TaskSupervisor::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn episodic(&self) -> &EpisodicStore {
        &self.episodic
    }

    pub fn graph(&self) -> &GraphRag {
        &self.graph
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    // -----------------------------------------------------------------------
    // Context assembly
    // -----------------------------------------------------------------------

    /// Build the memory context for `query` under `tier` (the configured
    /// default when `None`).
    ///
    /// Every lookup is best-effort: a failing source is logged and its
    /// section left out.
    #[tracing::instrument(name = "build_context", skip(self, query, system_prompt), fields(query_len = query.len()))]
    pub async fn build_context(
        &self,
        query: &str,
        tier: Option<&str>,
        system_prompt: Option<&str>,
        now: DateTime<Utc>,
    ) -> (String, ContextStats) {
        let tier = tier.unwrap_or(&self.config.context.default_tier);
        let mut optimizer = ContextOptimizer::for_tier(tier, &self.config);
        if let Some(prompt) = system_prompt {
            optimizer.add_section(SECTION_SYSTEM_PROMPT, prompt);
        }

        let (gap, working_context) = {
            let buffer = self.working.lock().await;
            (
                buffer.time_elapsed_context(now),
                buffer.progressive_context(self.config.working.full_turns, now),
            )
        };

        let temporal = TemporalParser::with_today(now.date_naive()).parse(query);
        let temporal_context = self.temporal_context(gap, temporal.as_ref(), now).await;

        let graph_result = self.graph.query(query).await;
        let enriched = enrich_query(query, &graph_result.entities, self.config.context.enrich_entities);

        let (long_term, archive) = tokio::join!(
            self.selector.context_budget_select(
                &self.episodic,
                &enriched,
                self.config.context.long_term_budget_tokens,
                temporal.as_ref(),
                now,
            ),
            self.session_archive(temporal.as_ref()),
        );

        optimizer.add_section(SECTION_TEMPORAL, &temporal_context);
        optimizer.add_section(SECTION_WORKING, &working_context);
        match archive {
            Ok(text) => optimizer.add_section(SECTION_ARCHIVE, &text),
            Err(e) => tracing::warn!(error = %e, "session archive lookup failed"),
        }
        match long_term {
            Ok(selection) => optimizer.add_section(SECTION_LONG_TERM, &selection.render()),
            Err(e) => tracing::warn!(error = %e, "long-term memory lookup failed"),
        }
        optimizer.add_section(SECTION_GRAPH, &graph_result.context);

        self.schedule_access_flush(now);
        optimizer.finish()
    }

    async fn temporal_context(
        &self,
        gap: String,
        temporal: Option<&TemporalFilter>,
        now: DateTime<Utc>,
    ) -> String {
        let mut lines = vec![format!("Current time: {}", now.format("%Y-%m-%d %H:%M UTC"))];
        if gap == FIRST_CONVERSATION {
            match self.archive.last_session_end().await {
                Ok(Some(ended)) => {
                    lines.push(format!("Last session ended {}.", relative_time(ended, now)))
                }
                Ok(None) => lines.push(gap),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read last session end");
                    lines.push(gap);
                }
            }
        } else if !gap.is_empty() {
            lines.push(gap);
        }
        match temporal {
            Some(TemporalFilter::Exact { date }) => lines.push(format!("Referenced date: {date}")),
            Some(TemporalFilter::Range { from, to }) => {
                lines.push(format!("Referenced period: {from} ~ {to}"))
            }
            None => {}
        }
        lines.join("\n")
    }

    async fn session_archive(&self, temporal: Option<&TemporalFilter>) -> Result<String, MemoryError> {
        let ctx = &self.config.context;
        let text = match temporal {
            Some(filter) => {
                self.archive
                    .sessions_by_date(
                        filter.start(),
                        Some(filter.end()),
                        ctx.session_archive_limit,
                        ctx.session_archive_budget_chars,
                    )
                    .await?
            }
            None => {
                self.archive
                    .recent_summaries(ctx.session_archive_limit, ctx.session_archive_budget_chars)
                    .await?
            }
        };
        Ok(text)
    }

    fn schedule_access_flush(&self, now: DateTime<Utc>) {
        self.supervisor.reap();
        if !self.episodic.access_tracker().should_flush(now) {
            return;
        }
        let store = self.episodic.clone();
        self.supervisor.spawn("access_flush", async move {
            store.maybe_flush_access(now).await.map(|_| ())
        });
    }

    // -----------------------------------------------------------------------
    // Turn recording
    // -----------------------------------------------------------------------

    /// Append a message to the working buffer and save the snapshot.
    ///
    /// Substantial user turns are queued for graph extraction, which uses
    /// rule-based recognition alone when no generator is configured.
    #[tracing::instrument(name = "add_message", skip(self, content), fields(role = %role, len = content.len()))]
    pub async fn add_message(&self, role: Role, content: &str, now: DateTime<Utc>) {
        {
            let mut buffer = self.working.lock().await;
            buffer.push(role, content, now);
            if let Err(e) = buffer.save(&self.working_store, now).await {
                tracing::warn!(error = %e, "failed to save working snapshot");
            }
        }

        if role == Role::User && content.chars().count() >= MIN_EXTRACTION_CHARS {
            let graph = self.graph.clone();
            let text = content.to_string();
            self.supervisor.spawn("graph_extract", async move {
                match graph.extract_and_store(&text, now).await.error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            });
        }
        self.supervisor.reap();
    }

    pub async fn get_turn_count(&self) -> usize {
        self.working.lock().await.turn_count()
    }

    pub async fn session_id(&self) -> String {
        self.working.lock().await.session_id().to_string()
    }

    /// Offer a memory to the episodic store. The current session id is
    /// attached when the memory names none, and importance is scored by the
    /// generator when the memory asks for it.
    pub async fn remember(
        &self,
        mut memory: NewMemory,
        now: DateTime<Utc>,
    ) -> Result<AddOutcome, MemoryError> {
        if memory.source_session.is_none() {
            memory.source_session = Some(self.session_id().await);
        }
        let memory = scored(memory, self.generator.as_deref()).await;
        self.episodic.add(memory, now).await
    }

    /// Like [`remember`](Self::remember) but runs under the supervisor,
    /// importance scoring included. Returns `false` once the engine is
    /// shutting down.
    pub async fn remember_later(&self, mut memory: NewMemory, now: DateTime<Utc>) -> bool {
        if memory.source_session.is_none() {
            memory.source_session = Some(self.session_id().await);
        }
        let store = self.episodic.clone();
        let generator = self.generator.clone();
        self.supervisor.spawn("remember", async move {
            let memory = scored(memory, generator.as_deref()).await;
            store.add(memory, now).await.map(|_| ())
        })
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Decay-based consolidation, then episodic-to-semantic generalization
    /// and a graph weight pass.
    #[tracing::instrument(name = "engine_consolidate", skip(self))]
    pub async fn consolidate(&self, now: DateTime<Utc>) -> Result<MaintenanceReport, MemoryError> {
        let graph = &self.graph;
        let episodic = self
            .episodic
            .consolidate(|r| graph.connections_for_text(&r.content), now)
            .await?;

        let semantic = match &self.generator {
            Some(generator) => Some(
                self.selector
                    .episodic_to_semantic(&self.episodic, generator.clone(), now)
                    .await?,
            ),
            None => {
                tracing::debug!("no generator configured; skipping semantic consolidation");
                None
            }
        };

        let weights = self.graph.recalculate_weights();
        if weights.changed > 0 {
            self.graph.persist().await?;
        }

        Ok(MaintenanceReport {
            episodic,
            semantic,
            graph_weights_changed: weights.changed,
        })
    }

    /// Evict faded memories, keeping the configured floor, and prune idle
    /// graph entities when pruning is enabled.
    #[tracing::instrument(name = "engine_evict", skip(self))]
    pub async fn evict(&self, dry_run: bool, now: DateTime<Utc>) -> Result<EvictionReport, MemoryError> {
        let graph = &self.graph;
        let mut report = self
            .selector
            .smart_eviction(&self.episodic, |r| graph.connections_for_text(&r.content), dry_run, now)
            .await?;

        if !dry_run && self.config.graph.prune.enabled {
            report.graph_entities_pruned = self.graph.prune(now);
            if report.graph_entities_pruned > 0 {
                self.graph.persist().await?;
            }
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Archive the current session as a digest and start a new one.
    ///
    /// Returns `None` without touching the archive when the buffer is empty.
    #[tracing::instrument(name = "end_session", skip(self))]
    pub async fn end_session(&self, now: DateTime<Utc>) -> Result<Option<SessionSummary>, MemoryError> {
        let mut buffer = self.working.lock().await;
        if buffer.is_empty() {
            return Ok(None);
        }

        let session_id = buffer.session_id().to_string();
        let started_at = buffer.session_start();
        let messages = buffer.messages();
        let items: Vec<String> = messages
            .iter()
            .map(|m| {
                let first_line = m.content.lines().next().unwrap_or_default();
                format!("{}: {first_line}", m.role)
            })
            .collect();
        let summary = SessionSummary {
            session_id,
            started_at,
            ended_at: now,
            message_count: messages.len(),
            summary: ContextOptimizer::format_as_bullets(&items, SESSION_DIGEST_ITEMS),
        };

        self.archive.archive(summary.clone()).await?;
        buffer.reset_session(now);
        if let Err(e) = buffer.save(&self.working_store, now).await {
            tracing::warn!(error = %e, "failed to save working snapshot after reset");
        }
        tracing::info!(
            session = %summary.session_id,
            messages = summary.message_count,
            "session archived"
        );
        Ok(Some(summary))
    }

    /// Write the working buffer, the graph and pending access updates.
    #[tracing::instrument(name = "engine_persist", skip(self))]
    pub async fn persist(&self, now: DateTime<Utc>) -> Result<(), MemoryError> {
        self.working.lock().await.save(&self.working_store, now).await?;
        self.graph.persist().await?;
        self.episodic.flush_access(now).await?;
        Ok(())
    }

    /// Give background work up to `timeout` to finish without cancelling it.
    pub async fn settle(&self, timeout: Duration) {
        let report = self.supervisor.settle(timeout).await;
        if !self.supervisor.is_empty() {
            tracing::debug!(
                finished = report.total(),
                pending = self.supervisor.len(),
                "background work still running"
            );
        }
    }

    /// Stop background work, then persist everything.
    #[tracing::instrument(name = "engine_shutdown", skip(self))]
    pub async fn shutdown(&self, grace: Duration, now: DateTime<Utc>) -> Result<(), MemoryError> {
        self.supervisor.shutdown(grace).await;
        self.persist(now).await
    }

    pub async fn status(&self) -> Result<EngineStatus, MemoryError> {
        let (session_id, working_messages, turn_count) = {
            let buffer = self.working.lock().await;
            (buffer.session_id().to_string(), buffer.len(), buffer.turn_count())
        };
        Ok(EngineStatus {
            session_id,
            working_messages,
            turn_count,
            episodic: self.episodic.stats().await?,
            graph: self.graph.stats(),
            background_tasks: self.supervisor.len(),
        })
    }
}

/// Replace a memory's importance with the generator's score when it asked
/// for one and a generator is configured.
async fn scored(mut memory: NewMemory, generator: Option<&BoxGenerator>) -> NewMemory {
    if let (true, Some(generator)) = (memory.score_importance, generator) {
        memory.importance = score_importance(generator, &memory.content).await;
        memory.score_importance = false;
    }
    memory
}

/// Append up to `max` entity names to the query used for long-term lookup.
fn enrich_query(query: &str, entities: &[Entity], max: usize) -> String {
    let names: Vec<&str> = entities.iter().take(max).map(|e| e.name.as_str()).collect();
    if names.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", names.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        MemoryArchive, MemoryDocument, MemoryIndex, ScriptedGenerator, Shared, WordEmbedder,
    };
    use chrono::TimeZone;
    use recall_types::graph::Entity;
    use recall_types::memory::MemoryType;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 15, 0, 0).unwrap()
    }

    struct Harness {
        engine: ContextEngine,
        index: Arc<MemoryIndex>,
        archive: Arc<MemoryArchive>,
        working: Arc<MemoryDocument<WorkingSnapshot>>,
        graph_docs: Arc<MemoryDocument<GraphDocument>>,
    }

    async fn harness_with(
        embedder: WordEmbedder,
        generator: Option<ScriptedGenerator>,
        config: EngineConfig,
    ) -> Harness {
        let index = Arc::new(MemoryIndex::default());
        let archive = Arc::new(MemoryArchive::default());
        let working = Arc::new(MemoryDocument::default());
        let graph_docs = Arc::new(MemoryDocument::default());
        let parts = EngineParts {
            index: BoxVectorIndex::new(Shared(index.clone())),
            embedder: BoxEmbedder::new(embedder),
            generator: generator.map(BoxGenerator::new),
            graph_store: BoxDocumentStore::new(Shared(graph_docs.clone())),
            working_store: BoxDocumentStore::new(Shared(working.clone())),
            archive: BoxSessionArchive::new(Shared(archive.clone())),
        };
        Harness {
            engine: ContextEngine::open(parts, config, now()).await,
            index,
            archive,
            working,
            graph_docs,
        }
    }

    async fn harness() -> Harness {
        harness_with(WordEmbedder::default(), None, EngineConfig::default()).await
    }

    #[tokio::test]
    async fn test_build_context_orders_sections() {
        let h = harness().await;
        h.engine
            .add_message(Role::User, "I am learning to brew pour-over coffee", now())
            .await;
        h.engine
            .remember(
                NewMemory::new("User brews pour-over coffee every morning", MemoryType::Fact)
                    .with_importance(0.9),
                now(),
            )
            .await
            .unwrap();

        let (context, stats) = h
            .engine
            .build_context("coffee brewing tips", None, Some("You are a helpful companion."), now())
            .await;

        let system = context.find("You are a helpful companion.").unwrap();
        let temporal = context.find("## Conversation Context").unwrap();
        let working = context.find("## Current Conversation").unwrap();
        let long_term = context.find("## Long-term Memory").unwrap();
        assert!(system < temporal && temporal < working && working < long_term);
        assert!(context.contains("- User brews pour-over coffee every morning"));
        assert!(!context.contains("## Relational Knowledge"));
        assert_eq!(stats.sections_added, 4);
    }

    #[tokio::test]
    async fn test_failed_long_term_lookup_drops_only_that_section() {
        let h = harness_with(WordEmbedder::failing(), None, EngineConfig::default()).await;
        h.engine.add_message(Role::User, "hello there", now()).await;

        let (context, _) = h.engine.build_context("anything", None, None, now()).await;
        assert!(context.contains("## Current Conversation"));
        assert!(!context.contains("## Long-term Memory"));
    }

    #[tokio::test]
    async fn test_temporal_query_uses_archive_by_date() {
        let h = harness().await;
        let yesterday = now() - chrono::Duration::days(1);
        let last_week = now() - chrono::Duration::days(9);
        for (id, at, text) in [("s-old", last_week, "- talked about taxes"), ("s-y", yesterday, "- planned a hike")] {
            h.archive.sessions.lock().unwrap().push(SessionSummary {
                session_id: id.into(),
                started_at: at,
                ended_at: at + chrono::Duration::hours(1),
                message_count: 4,
                summary: text.into(),
            });
        }

        let (context, _) = h
            .engine
            .build_context("what did we talk about yesterday", None, None, now())
            .await;
        assert!(context.contains("Referenced date: 2024-05-19"));
        assert!(context.contains("planned a hike"));
        assert!(!context.contains("talked about taxes"));
        assert!(context.contains("Last session ended"));
    }

    #[tokio::test]
    async fn test_graph_context_and_enrichment() {
        let h = harness().await;
        h.engine.graph().with_graph_mut(|g| {
            let mark = g.add_entity(Entity::new("Mark", "person", now()), now()).unwrap();
            let rust = g.add_entity(Entity::new("Rust", "tool", now()), now()).unwrap();
            g.add_relation(recall_types::graph::Relation::new(&mark, &rust, "uses", now()), now());
        });
        h.engine
            .remember(NewMemory::new("Rust borrow checker notes", MemoryType::Fact), now())
            .await
            .unwrap();

        let (context, _) = h.engine.build_context("how is Mark doing", None, None, now()).await;
        assert!(context.contains("## Relational Knowledge"));
        assert!(context.contains("Mark --[uses]--> Rust"));
        assert!(context.contains("Rust borrow checker notes"));
    }

    #[tokio::test]
    async fn test_add_message_persists_and_counts_turns() {
        let h = harness().await;
        h.engine.add_message(Role::User, "hi", now()).await;
        h.engine.add_message(Role::Assistant, "hello!", now()).await;
        assert_eq!(h.engine.get_turn_count().await, 1);
        let saved = h.working.doc.lock().unwrap().clone().unwrap();
        assert_eq!(saved.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_user_turn_is_extracted_in_background() {
        let generator = ScriptedGenerator::default().with_rule(
            "Extract only the entities",
            r#"{"entities": [{"name": "Seoul", "type": "place", "importance": 0.9}], "relations": []}"#,
        );
        let h = harness_with(WordEmbedder::default(), Some(generator), EngineConfig::default()).await;
        h.engine
            .add_message(Role::User, "I moved to Seoul for a new job last month", now())
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.engine.supervisor().reap().completed, 1);

        h.engine.shutdown(Duration::from_secs(5), now()).await.unwrap();
        let doc = h.graph_docs.doc.lock().unwrap().clone().unwrap();
        assert!(doc.entities.iter().any(|e| e.name == "Seoul"));
    }

    #[tokio::test]
    async fn test_user_turn_builds_graph_without_generator() {
        let h = harness().await;
        h.engine
            .add_message(Role::User, "Had lunch with Jane Doe near Acme Labs today", now())
            .await;
        h.engine
            .add_message(Role::Assistant, "Sounds like Jane Doe is a good friend", now())
            .await;
        h.engine.settle(Duration::from_secs(5)).await;

        let stats = h.engine.graph().stats();
        assert_eq!(stats.total_entities, 2);
        assert!(h.engine.graph().read().neighbors("jane_doe", 1).contains("acme_labs"));
        let doc = h.graph_docs.doc.lock().unwrap().clone().unwrap();
        assert_eq!(doc.entities.len(), 2);
    }

    #[tokio::test]
    async fn test_end_session_archives_and_resets() {
        let h = harness().await;
        assert_eq!(h.engine.end_session(now()).await.unwrap(), None);

        let before = h.engine.session_id().await;
        h.engine.add_message(Role::User, "plan the trip\nwith details", now()).await;
        h.engine.add_message(Role::Assistant, "sure, where to?", now()).await;

        let summary = h.engine.end_session(now()).await.unwrap().unwrap();
        assert_eq!(summary.session_id, before);
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.summary, "- user: plan the trip\n- assistant: sure, where to?");
        assert_eq!(h.archive.sessions.lock().unwrap().len(), 1);
        assert_eq!(h.engine.get_turn_count().await, 0);
        assert_ne!(h.engine.session_id().await, before);
    }

    #[tokio::test]
    async fn test_remember_attaches_session() {
        let h = harness().await;
        let session = h.engine.session_id().await;
        h.engine
            .remember(NewMemory::new("likes jazz", MemoryType::Preference), now())
            .await
            .unwrap();
        let record = &h.index.records()[0];
        match &record.provenance {
            recall_types::memory::MemoryProvenance::Episodic { source_session, .. } => {
                assert_eq!(source_session.as_deref(), Some(session.as_str()));
            }
            other => panic!("unexpected provenance {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_consolidate_without_generator_skips_semantic() {
        let h = harness().await;
        h.engine
            .remember(NewMemory::new("some fact", MemoryType::Fact), now())
            .await
            .unwrap();
        let report = h.engine.consolidate(now()).await.unwrap();
        assert_eq!(report.episodic.checked, 1);
        assert!(report.semantic.is_none());
    }

    #[tokio::test]
    async fn test_evict_respects_floor_and_dry_run() {
        let h = harness().await;
        let old = now() - chrono::Duration::days(400);
        for i in 0..5 {
            h.engine
                .remember(
                    NewMemory::new(format!("faded note number {i}"), MemoryType::Conversation)
                        .with_importance(0.3)
                        .with_event_time(old),
                    old,
                )
                .await
                .unwrap();
        }

        let dry = h.engine.evict(true, now()).await.unwrap();
        assert_eq!(dry.candidates, 5);
        assert_eq!(dry.evicted, 0);
        assert_eq!(h.index.records().len(), 5);

        let real = h.engine.evict(false, now()).await.unwrap();
        assert_eq!(real.evicted, 2);
        assert_eq!(h.index.records().len(), 3);
    }

    #[tokio::test]
    async fn test_status_reports_components() {
        let h = harness().await;
        h.engine.add_message(Role::User, "hi", now()).await;
        let status = h.engine.status().await.unwrap();
        assert_eq!(status.working_messages, 1);
        assert_eq!(status.episodic.total, 0);
        assert_eq!(status.graph.total_entities, 0);
    }

    #[tokio::test]
    async fn test_remember_later_scores_importance_with_generator() {
        let generator = ScriptedGenerator::default().with_rule("Rate how important", "0.9");
        let h = harness_with(WordEmbedder::default(), Some(generator), EngineConfig::default()).await;
        assert!(
            h.engine
                .remember_later(
                    NewMemory::new("User is allergic to peanuts", MemoryType::Fact).with_model_importance(),
                    now(),
                )
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.engine.supervisor().reap().completed, 1);
        assert_eq!(h.index.records()[0].importance, 0.9);
    }

    #[tokio::test]
    async fn test_explicit_importance_is_not_rescored() {
        let generator = ScriptedGenerator::default().with_rule("Rate how important", "0.9");
        let h = harness_with(WordEmbedder::default(), Some(generator), EngineConfig::default()).await;
        h.engine
            .remember(
                NewMemory::new("User prefers tea", MemoryType::Preference)
                    .with_model_importance()
                    .with_importance(0.4),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(h.index.records()[0].importance, 0.4);
    }

    #[tokio::test]
    async fn test_model_importance_without_generator_keeps_default() {
        let h = harness().await;
        h.engine
            .remember(
                NewMemory::new("User prefers tea", MemoryType::Preference).with_model_importance(),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(h.index.records()[0].importance, 0.5);
    }

    #[test]
    fn test_enrich_query_appends_names() {
        let entities = vec![
            Entity::new("Mark", "person", now()),
            Entity::new("Rust", "tool", now()),
        ];
        assert_eq!(enrich_query("q", &entities, 1), "q Mark");
        assert_eq!(enrich_query("q", &[], 3), "q");
    }
}
