//! Knowledge graph types: entities, relations, and the persisted document.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity type assigned when the extractor gives no better classification.
pub const GENERIC_ENTITY_TYPE: &str = "concept";

/// Relation type assigned when the extractor omits one.
pub const DEFAULT_RELATION_TYPE: &str = "related_to";

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Derived from the normalized name (see [`Entity::id_for`]).
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_mentions")]
    pub mentions: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

fn default_mentions() -> u32 {
    1
}

impl Entity {
    pub fn new(name: &str, entity_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::id_for(name),
            name: name.trim().to_string(),
            entity_type: entity_type.to_string(),
            properties: BTreeMap::new(),
            mentions: 1,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Canonical id for a display name: trimmed, lowercased, spaces to underscores.
    pub fn id_for(name: &str) -> String {
        name.trim().to_lowercase().replace(' ', "_")
    }
}

/// A directed, typed edge. Adjacency is tracked in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub context: String,
    pub created_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    1.0
}

impl Relation {
    pub fn new(source_id: &str, target_id: &str, relation_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type: relation_type.to_string(),
            weight: 1.0,
            context: String::new(),
            created_at: now,
        }
    }

    /// Stable key: `source--type-->target`.
    pub fn id(&self) -> String {
        Self::key(&self.source_id, &self.relation_type, &self.target_id)
    }

    pub fn key(source_id: &str, relation_type: &str, target_id: &str) -> String {
        format!("{source_id}--{relation_type}-->{target_id}")
    }
}

/// Aggregate counts over the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relations: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub relation_types: BTreeMap<String, usize>,
    pub avg_connections: f64,
}

/// The whole graph as written to disk.
///
/// Co-occurrence counts are keyed by the unordered pair `"a|b"` with `a < b`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub cooccurrence: HashMap<String, u32>,
    #[serde(default)]
    pub entity_mentions: HashMap<String, u32>,
}

/// Which recognizers produced an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Rule-based recognition only; no generator is configured.
    #[default]
    NerOnly,
    /// Generator output merged over the rule-based baseline.
    Hybrid,
    /// The generator failed; the rule-based baseline was stored instead.
    NerFallback,
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities_added: usize,
    pub relations_added: usize,
    pub mode: ExtractionMode,
    pub error: Option<String>,
}

/// Entities, relations, and paths relevant to a query, plus a rendered summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQueryResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub paths: Vec<Vec<String>>,
    pub context: String,
    pub relevance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_normalization() {
        assert_eq!(Entity::id_for("  New York City "), "new_york_city");
        assert_eq!(Entity::id_for("Rust"), "rust");
    }

    #[test]
    fn test_relation_key() {
        let r = Relation::new("alice", "rust", "uses", Utc::now());
        assert_eq!(r.id(), "alice--uses-->rust");
        assert_eq!(r.weight, 1.0);
    }

    #[test]
    fn test_document_deserialize_missing_fields() {
        let doc: GraphDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.entities.is_empty());
        assert!(doc.cooccurrence.is_empty());
    }

    #[test]
    fn test_entity_mentions_default() {
        let json = r#"{
            "id": "rust", "name": "Rust", "entity_type": "language",
            "created_at": "2024-01-01T00:00:00Z", "last_accessed": "2024-01-01T00:00:00Z"
        }"#;
        let e: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(e.mentions, 1);
        assert!(e.properties.is_empty());
    }
}
