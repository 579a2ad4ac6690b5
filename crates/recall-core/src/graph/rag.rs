//! Extraction and retrieval over the [`KnowledgeGraph`].
//!
//! `GraphRag` owns the graph behind a lock together with its document store.
//! Extraction always runs the rule-based [`NerExtractor`]; with a generator
//! configured its reply is merged over that baseline, and a failed call
//! falls back to the baseline alone. Every extraction that stores something
//! persists the whole graph. Query failures degrade to an empty
//! contribution with a warning.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use recall_types::config::GraphConfig;
use recall_types::error::RepositoryError;
use recall_types::graph::{
    DEFAULT_RELATION_TYPE, Entity, ExtractionMode, ExtractionResult, GENERIC_ENTITY_TYPE,
    GraphDocument, GraphQueryResult, GraphStats, Relation,
};

use super::ner::{NerEntity, NerExtractor};
use super::store::{KnowledgeGraph, WeightUpdate};
use crate::llm::box_generator::BoxGenerator;
use crate::llm::json::{parse_model_json, preview};
use crate::storage::box_document::BoxDocumentStore;

/// Characters of input text included in the extraction prompt.
const EXTRACTION_TEXT_CHARS: usize = 800;
/// Depth used when searching paths between result entities.
const PATH_SEARCH_DEPTH: usize = 3;
const FORMAT_MAX_PATHS: usize = 3;
/// Keyword matches taken per query word.
const MATCHES_PER_WORD: usize = 2;
/// Context stored on relations inferred from names sharing a sentence.
const COOCCURRENCE_CONTEXT: &str = "mentioned together";

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(default, rename = "type")]
    entity_type: Option<String>,
    #[serde(default = "default_importance")]
    importance: f64,
}

fn default_importance() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    source: String,
    target: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    context: String,
}

impl From<&NerEntity> for RawEntity {
    fn from(e: &NerEntity) -> Self {
        Self {
            name: e.name.clone(),
            entity_type: Some(e.entity_type.clone()),
            importance: e.importance,
        }
    }
}

impl RawExtraction {
    /// Baseline entities, linked pairwise when they share a sentence.
    fn from_ner(baseline: &[NerEntity]) -> Self {
        Self {
            entities: baseline.iter().map(RawEntity::from).collect(),
            relations: NerExtractor::cooccurrences(baseline)
                .into_iter()
                .map(|(source, target)| RawRelation {
                    source,
                    target,
                    relation: None,
                    context: COOCCURRENCE_CONTEXT.to_string(),
                })
                .collect(),
        }
    }

    /// Generator entities win on a case-insensitive name match; names only
    /// the baseline found are appended. Relations stay the generator's.
    fn merged_over(mut self, baseline: &[NerEntity]) -> Self {
        let known: HashSet<String> = self.entities.iter().map(|e| e.name.to_lowercase()).collect();
        self.entities.extend(
            baseline
                .iter()
                .filter(|e| !known.contains(&e.name.to_lowercase()))
                .map(RawEntity::from),
        );
        self
    }
}

/// Knowledge graph plus the generator and document store around it.
pub struct GraphRag {
    graph: RwLock<KnowledgeGraph>,
    store: BoxDocumentStore<GraphDocument>,
    generator: Option<Arc<BoxGenerator>>,
    ner: NerExtractor,
    config: GraphConfig,
}

impl GraphRag {
    pub fn new(
        graph: KnowledgeGraph,
        store: BoxDocumentStore<GraphDocument>,
        generator: Option<Arc<BoxGenerator>>,
        config: GraphConfig,
    ) -> Self {
        Self {
            graph: RwLock::new(graph),
            store,
            generator,
            ner: NerExtractor::new(),
            config,
        }
    }

    /// Load the persisted graph. A missing or corrupt document yields an empty graph.
    #[tracing::instrument(name = "graph_load", skip_all)]
    pub async fn load(
        store: BoxDocumentStore<GraphDocument>,
        generator: Option<Arc<BoxGenerator>>,
        config: GraphConfig,
    ) -> Self {
        let graph = match store.load().await {
            Ok(Some(document)) => KnowledgeGraph::from_document(document),
            Ok(None) => KnowledgeGraph::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load knowledge graph; starting empty");
                KnowledgeGraph::new()
            }
        };
        Self::new(graph, store, generator, config)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn read(&self) -> RwLockReadGuard<'_, KnowledgeGraph> {
        self.graph.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, KnowledgeGraph> {
        self.graph.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `f` with exclusive access to the graph.
    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut KnowledgeGraph) -> R) -> R {
        f(&mut self.write())
    }

    /// Write the whole graph to the document store.
    pub async fn persist(&self) -> Result<(), RepositoryError> {
        let document = self.read().to_document();
        self.store.save(&document).await?;
        tracing::debug!(
            entities = document.entities.len(),
            relations = document.relations.len(),
            "graph saved"
        );
        Ok(())
    }

    pub fn stats(&self) -> GraphStats {
        self.read().stats()
    }

    pub fn connections_for_text(&self, text: &str) -> u32 {
        self.read().connections_for_text(text)
    }

    pub fn recalculate_weights(&self) -> WeightUpdate {
        self.write().recalculate_weights()
    }

    /// Apply the configured prune policy. No-op unless it is enabled.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        if !self.config.prune.enabled {
            return 0;
        }
        self.write().prune(&self.config.prune, now)
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Find entities and relations in `text` and merge them into the graph.
    ///
    /// Entities below `importance_threshold` are dropped. Relations are kept
    /// only when both endpoints were accepted in the same pass.
    #[tracing::instrument(name = "graph_extract", skip(self, text), fields(text_len = text.len()))]
    pub async fn extract_and_store(&self, text: &str, now: DateTime<Utc>) -> ExtractionResult {
        let baseline = self.ner.extract(text);
        let mut result = ExtractionResult::default();
        let raw = match &self.generator {
            None => RawExtraction::from_ner(&baseline),
            Some(generator) => match generate_extraction(generator, text).await {
                Ok(raw) => {
                    result.mode = ExtractionMode::Hybrid;
                    raw.merged_over(&baseline)
                }
                Err(error) => {
                    result.mode = ExtractionMode::NerFallback;
                    result.error = Some(error);
                    RawExtraction::from_ner(&baseline)
                }
            },
        };
        if raw.entities.is_empty() {
            return result;
        }

        {
            let mut graph = self.write();
            let mut accepted: BTreeMap<String, String> = BTreeMap::new();
            let mut filtered = 0usize;
            for e in raw.entities {
                if e.importance < self.config.importance_threshold {
                    filtered += 1;
                    continue;
                }
                let entity_type = e
                    .entity_type
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_ENTITY_TYPE.to_string());
                let mut entity = Entity::new(&e.name, &entity_type, now);
                entity
                    .properties
                    .insert("importance".into(), serde_json::json!(e.importance));
                if let Some(id) = graph.add_entity(entity, now) {
                    accepted.insert(e.name, id);
                    result.entities_added += 1;
                }
            }

            for r in raw.relations {
                let (Some(source), Some(target)) = (accepted.get(&r.source), accepted.get(&r.target))
                else {
                    continue;
                };
                let relation_type = r
                    .relation
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string());
                let mut relation = Relation::new(source, target, &relation_type, now);
                relation.context = r.context;
                if graph.add_relation(relation, now).is_some() {
                    result.relations_added += 1;
                }
            }
            tracing::debug!(filtered, "low-importance entities dropped");
        }

        if result.entities_added == 0 {
            return result;
        }
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "failed to persist knowledge graph");
            result.error = Some(e.to_string());
        }
        tracing::info!(
            entities = result.entities_added,
            relations = result.relations_added,
            mode = ?result.mode,
            "graph extraction stored"
        );
        result
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Keyword lookup without a model call: every query word longer than two
    /// characters is matched against entity names.
    pub fn query_sync(&self, query: &str) -> GraphQueryResult {
        let graph = self.read();
        let seeds = keyword_seeds(&graph, query);
        self.expand(&graph, seeds, false)
    }

    /// Ask the generator which entities `query` mentions, falling back to
    /// keyword lookup when the call fails or names nothing known.
    #[tracing::instrument(name = "graph_query", skip(self, query), fields(query_len = query.len()))]
    pub async fn query(&self, query: &str) -> GraphQueryResult {
        let names = match &self.generator {
            Some(generator) => self.query_entity_names(generator, query).await,
            None => Vec::new(),
        };

        let graph = self.read();
        let mut seeds: Vec<String> = names
            .iter()
            .filter_map(|name| graph.find_entities_by_name(name).first().map(|e| e.id.clone()))
            .collect();
        if seeds.is_empty() {
            seeds = keyword_seeds(&graph, query);
        }
        self.expand(&graph, seeds, true)
    }

    async fn query_entity_names(&self, generator: &BoxGenerator, query: &str) -> Vec<String> {
        let prompt = format!(
            "Extract the key entities (names, concepts, tools) mentioned in the question.\n\n\
             Question: \"{query}\"\n\n\
             Respond with a JSON array of entity names only:\n[\"entity1\", \"entity2\"]"
        );
        match generator.generate(&prompt).await {
            Ok(reply) => match parse_model_json::<Vec<String>>(&reply) {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(error = %e, reply = %preview(&reply), "query entity reply was not valid JSON");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "query entity extraction failed");
                Vec::new()
            }
        }
    }

    fn expand(&self, graph: &KnowledgeGraph, seeds: Vec<String>, with_paths: bool) -> GraphQueryResult {
        let cfg = &self.config;
        if seeds.is_empty() {
            return GraphQueryResult::default();
        }

        let mut ids: Vec<String> = Vec::new();
        let mut related: Vec<String> = Vec::new();
        for seed in seeds.iter().take(cfg.max_query_entities) {
            if !ids.contains(seed) {
                ids.push(seed.clone());
            }
            related.extend(graph.neighbors(seed, cfg.max_depth));
        }
        related.sort_by(|a, b| {
            let ma = graph.entity(a).map(|e| e.mentions).unwrap_or(0);
            let mb = graph.entity(b).map(|e| e.mentions).unwrap_or(0);
            mb.cmp(&ma).then_with(|| a.cmp(b))
        });
        for id in related {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let entities: Vec<Entity> = ids
            .iter()
            .filter_map(|id| graph.entity(id).cloned())
            .take(cfg.max_entities)
            .collect();

        let mut relations: Vec<Relation> = Vec::new();
        for entity in &entities {
            for relation in graph.relations_for_entity(&entity.id) {
                if !relations.iter().any(|r| r.id() == relation.id()) {
                    relations.push(relation.clone());
                }
            }
        }
        relations.truncate(cfg.max_relations);

        let mut paths = Vec::new();
        if with_paths {
            let head: Vec<&str> = entities
                .iter()
                .take(cfg.max_query_entities + 1)
                .map(|e| e.id.as_str())
                .collect();
            for (i, a) in head.iter().enumerate().take(cfg.max_query_entities) {
                for b in &head[i + 1..] {
                    let path = graph.find_path(a, b, PATH_SEARCH_DEPTH);
                    if path.len() > 1 {
                        paths.push(path);
                    }
                }
            }
            paths.truncate(cfg.max_paths);
        }

        let context = self.format_context(graph, &entities, &relations, &paths);
        GraphQueryResult {
            relevance: (entities.len() as f64 * 0.2).min(1.0),
            entities,
            relations,
            paths,
            context,
        }
    }

    /// Render a result as markdown-ish sections for the prompt.
    pub fn format_context(
        &self,
        graph: &KnowledgeGraph,
        entities: &[Entity],
        relations: &[Relation],
        paths: &[Vec<String>],
    ) -> String {
        let cfg = &self.config;
        let name_of = |id: &str| {
            graph
                .entity(id)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let mut parts = Vec::new();

        if !entities.is_empty() {
            parts.push("### Entities".to_string());
            for e in entities.iter().take(cfg.max_format_entities) {
                let props = e
                    .properties
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                if props.is_empty() {
                    parts.push(format!("- **{}** ({})", e.name, e.entity_type));
                } else {
                    parts.push(format!("- **{}** ({}): {props}", e.name, e.entity_type));
                }
            }
        }

        let rendered: Vec<String> = relations
            .iter()
            .take(cfg.max_format_relations)
            .filter(|r| graph.entity(&r.source_id).is_some() && graph.entity(&r.target_id).is_some())
            .map(|r| {
                format!(
                    "- {} --[{}]--> {}",
                    name_of(r.source_id.as_str()),
                    r.relation_type,
                    name_of(r.target_id.as_str())
                )
            })
            .collect();
        if !rendered.is_empty() {
            parts.push("\n### Relations".to_string());
            parts.extend(rendered);
        }

        if !paths.is_empty() {
            parts.push("\n### Paths".to_string());
            for path in paths.iter().take(FORMAT_MAX_PATHS) {
                let names: Vec<String> = path.iter().map(|id| name_of(id.as_str())).collect();
                parts.push(format!("- {}", names.join(" -> ")));
            }
        }

        parts.join("\n")
    }
}

/// Ask the generator for an extraction. The error is a short reason for
/// [`ExtractionResult::error`].
async fn generate_extraction(generator: &BoxGenerator, text: &str) -> Result<RawExtraction, String> {
    let reply = generator.generate(&extraction_prompt(text)).await.map_err(|e| {
        tracing::warn!(error = %e, "graph extraction failed; using rule-based entities");
        e.to_string()
    })?;
    parse_model_json(&reply).map_err(|e| {
        tracing::warn!(error = %e, reply = %preview(&reply), "graph extraction reply was not valid JSON");
        "json_parse".to_string()
    })
}

fn keyword_seeds(graph: &KnowledgeGraph, query: &str) -> Vec<String> {
    let mut seeds = Vec::new();
    for word in query.to_lowercase().split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.chars().count() <= 2 {
            continue;
        }
        for entity in graph.find_entities_by_name(word).into_iter().take(MATCHES_PER_WORD) {
            if !seeds.contains(&entity.id) {
                seeds.push(entity.id.clone());
            }
        }
    }
    seeds
}

fn extraction_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(EXTRACTION_TEXT_CHARS).collect();
    format!(
        r#"Extract only the entities from this conversation that matter to the user over the long term.

Text: "{excerpt}"

Importance guide:
- the user's personal details, habits, health: 0.9+
- the user's ongoing projects: 0.85+
- tools and technologies the user uses often: 0.8+
- important people in the user's life: 0.8+
- recurring preferences and tastes: 0.7+
- passing concepts, HTTP headers, code snippets: ignore (importance 0)

Respond with JSON only:
{{
  "entities": [
    {{"name": "entity name", "type": "person/concept/tool/preference/project", "importance": 0.0-1.0}}
  ],
  "relations": [
    {{"source": "entity1", "target": "entity2", "relation": "uses/likes/knows/manages"}}
  ]
}}"#
    )
}
