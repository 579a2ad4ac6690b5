//! In-process entity/relation graph.
//!
//! Entities are keyed by a normalized id derived from their name; relations by
//! `(source, type, target)`. Adjacency is undirected even though relations keep
//! their direction. Co-occurrence counts collected on repeat relations feed
//! [`KnowledgeGraph::recalculate_weights`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use recall_types::config::GraphPruneConfig;
use recall_types::graph::{Entity, GENERIC_ENTITY_TYPE, GraphDocument, GraphStats, Relation};

/// Names never accepted as generic `concept` entities.
const ENTITY_STOPWORDS: &[&str] = &[
    "the", "a", "an", "this", "that", "it", "is", "was", "are", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "must", "shall", "not", "no", "yes", "and", "or", "but", "if", "then", "else",
    "he", "she", "they", "we", "i", "you", "me", "us", "him", "her", "thing", "things",
    "stuff", "something", "anything", "그", "이", "저", "것", "거", "그것", "이것",
];

const REPEAT_WEIGHT_INCREMENT: f64 = 0.1;
const TFIDF_WEIGHT: f64 = 0.7;

/// Counts from a weight recalculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeightUpdate {
    pub total: usize,
    pub changed: usize,
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Entity/relation graph with undirected adjacency.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    entities: BTreeMap<String, Entity>,
    relations: BTreeMap<String, Relation>,
    adjacency: HashMap<String, BTreeSet<String>>,
    /// Lowercased display name -> entity id.
    name_index: HashMap<String, String>,
    /// Entity id -> ids of relations touching it.
    relation_index: HashMap<String, Vec<String>>,
    cooccurrence: HashMap<(String, String), u32>,
    entity_mentions: HashMap<String, u32>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from its persisted form. Relations whose endpoints are
    /// missing are dropped.
    pub fn from_document(document: GraphDocument) -> Self {
        let mut graph = Self::new();
        for entity in document.entities {
            graph
                .name_index
                .insert(entity.name.to_lowercase(), entity.id.clone());
            graph.entities.insert(entity.id.clone(), entity);
        }
        for relation in document.relations {
            if !graph.entities.contains_key(&relation.source_id)
                || !graph.entities.contains_key(&relation.target_id)
            {
                tracing::warn!(relation = %relation.id(), "dropping relation with missing endpoint");
                continue;
            }
            graph.link(relation);
        }
        for (key, count) in document.cooccurrence {
            if let Some((a, b)) = key.split_once('|') {
                graph.cooccurrence.insert(pair_key(a, b), count);
            }
        }
        graph.entity_mentions = document.entity_mentions;
        tracing::debug!(
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "graph loaded"
        );
        graph
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            entities: self.entities.values().cloned().collect(),
            relations: self.relations.values().cloned().collect(),
            cooccurrence: self
                .cooccurrence
                .iter()
                .map(|((a, b), count)| (format!("{a}|{b}"), *count))
                .collect(),
            entity_mentions: self.entity_mentions.clone(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // -----------------------------------------------------------------------
    // Upserts
    // -----------------------------------------------------------------------

    /// Insert or merge `entity`. Returns the id it is stored under, or `None`
    /// when the name is empty or a stopword for a generic concept.
    ///
    /// A merge adds mentions, merges properties, refreshes `last_accessed`,
    /// and replaces a generic type with a specific one.
    pub fn add_entity(&mut self, mut entity: Entity, now: DateTime<Utc>) -> Option<String> {
        let name = normalize_name(&entity.name);
        let lowered = name.to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        if entity.entity_type == GENERIC_ENTITY_TYPE && ENTITY_STOPWORDS.contains(&lowered.as_str()) {
            tracing::debug!(name = %name, "stopword entity filtered");
            return None;
        }

        let id = self
            .name_index
            .get(&lowered)
            .filter(|id| self.entities.contains_key(*id))
            .cloned()
            .unwrap_or_else(|| Entity::id_for(&name));

        if let Some(existing) = self.entities.get_mut(&id) {
            existing.mentions = existing.mentions.saturating_add(entity.mentions.max(1));
            existing.last_accessed = now;
            if existing.entity_type == GENERIC_ENTITY_TYPE && entity.entity_type != GENERIC_ENTITY_TYPE {
                existing.entity_type = entity.entity_type;
            }
            existing.properties.extend(entity.properties);
            self.name_index.insert(lowered, id.clone());
            return Some(id);
        }

        entity.id = id.clone();
        entity.name = name;
        entity.created_at = now;
        entity.last_accessed = now;
        self.name_index.insert(lowered, id.clone());
        self.entities.insert(id.clone(), entity);
        Some(id)
    }

    /// Insert `relation`, or strengthen it when it already exists.
    ///
    /// Both endpoints must exist; otherwise the relation is rejected and
    /// `None` is returned.
    pub fn add_relation(&mut self, mut relation: Relation, now: DateTime<Utc>) -> Option<String> {
        for endpoint in [&relation.source_id, &relation.target_id] {
            if !self.entities.contains_key(endpoint) {
                tracing::warn!(id = %endpoint, "relation endpoint not found");
                return None;
            }
        }

        let id = relation.id();
        if let Some(existing) = self.relations.get_mut(&id) {
            existing.weight += REPEAT_WEIGHT_INCREMENT;
            *self
                .cooccurrence
                .entry(pair_key(&relation.source_id, &relation.target_id))
                .or_insert(0) += 1;
            *self
                .entity_mentions
                .entry(relation.source_id.clone())
                .or_insert(0) += 1;
            *self
                .entity_mentions
                .entry(relation.target_id.clone())
                .or_insert(0) += 1;
            return Some(id);
        }

        relation.created_at = now;
        self.link(relation);
        Some(id)
    }

    fn link(&mut self, relation: Relation) {
        let id = relation.id();
        self.adjacency
            .entry(relation.source_id.clone())
            .or_default()
            .insert(relation.target_id.clone());
        self.adjacency
            .entry(relation.target_id.clone())
            .or_default()
            .insert(relation.source_id.clone());
        self.relation_index
            .entry(relation.source_id.clone())
            .or_default()
            .push(id.clone());
        if relation.target_id != relation.source_id {
            self.relation_index
                .entry(relation.target_id.clone())
                .or_default()
                .push(id.clone());
        }
        self.relations.insert(id, relation);
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// Case-insensitive substring match on entity names.
    pub fn find_entities_by_name(&self, fragment: &str) -> Vec<&Entity> {
        let needle = fragment.to_lowercase();
        self.entities
            .values()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn find_entities_by_type(&self, entity_type: &str) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    pub fn relations_for_entity(&self, id: &str) -> Vec<&Relation> {
        self.relation_index
            .get(id)
            .map(|ids| ids.iter().filter_map(|r| self.relations.get(r)).collect())
            .unwrap_or_default()
    }

    /// Number of distinct neighbors of `id`.
    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map(BTreeSet::len).unwrap_or(0)
    }

    /// Entities reachable within `depth` hops, excluding `id` itself.
    pub fn neighbors(&self, id: &str, depth: usize) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        if depth == 0 || !self.entities.contains_key(id) {
            return visited;
        }
        visited.insert(id.to_string());
        let mut frontier = vec![id.to_string()];
        for _ in 0..depth {
            let mut next = Vec::new();
            for node in &frontier {
                for neighbor in self.adjacency.get(node).into_iter().flatten() {
                    if visited.insert(neighbor.clone()) {
                        next.push(neighbor.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited.remove(id);
        visited
    }

    /// First path found by breadth-first search, as entity ids.
    ///
    /// `[from]` when `from == to`; empty when either end is unknown or no path
    /// of at most `max_depth` hops exists.
    pub fn find_path(&self, from: &str, to: &str, max_depth: usize) -> Vec<String> {
        if !self.entities.contains_key(from) || !self.entities.contains_key(to) {
            return Vec::new();
        }
        if from == to {
            return vec![from.to_string()];
        }

        let mut visited = BTreeSet::from([from.to_string()]);
        let mut queue = VecDeque::from([vec![from.to_string()]]);
        while let Some(path) = queue.pop_front() {
            if path.len() > max_depth {
                break;
            }
            let Some(current) = path.last() else { continue };
            for neighbor in self.adjacency.get(current).into_iter().flatten() {
                if neighbor == to {
                    let mut found = path.clone();
                    found.push(neighbor.clone());
                    return found;
                }
                if visited.insert(neighbor.clone()) {
                    let mut next = path.clone();
                    next.push(neighbor.clone());
                    queue.push_back(next);
                }
            }
        }
        Vec::new()
    }

    /// Sum of the degrees of every entity whose name occurs in `text`.
    ///
    /// Used as the connection count of a memory when computing decay.
    pub fn connections_for_text(&self, text: &str) -> u32 {
        let haystack = text.to_lowercase();
        self.entities
            .values()
            .filter(|e| e.name.chars().count() >= 2 && haystack.contains(&e.name.to_lowercase()))
            .map(|e| self.degree(&e.id) as u32)
            .sum()
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Re-weight every relation by co-occurrence TF-IDF:
    ///
    /// ```text
    /// tf     = pair_count / source_mentions
    /// idf    = ln(total_entities / (1 + source_cooccurring_pairs))
    /// weight = clamp(0.7 * tf * idf + 0.3 * weight, 0, 1)
    /// ```
    pub fn recalculate_weights(&mut self) -> WeightUpdate {
        let total_entities = self.entities.len().max(1) as f64;
        let mut pairs_per_entity: HashMap<&str, u32> = HashMap::new();
        for (a, b) in self.cooccurrence.keys() {
            *pairs_per_entity.entry(a.as_str()).or_insert(0) += 1;
            *pairs_per_entity.entry(b.as_str()).or_insert(0) += 1;
        }

        let mut changed = 0;
        for relation in self.relations.values_mut() {
            let pair_count = self
                .cooccurrence
                .get(&pair_key(&relation.source_id, &relation.target_id))
                .copied()
                .unwrap_or(1) as f64;
            let source_total = self
                .entity_mentions
                .get(&relation.source_id)
                .copied()
                .unwrap_or(1)
                .max(1) as f64;
            let source_pairs = pairs_per_entity
                .get(relation.source_id.as_str())
                .copied()
                .unwrap_or(0) as f64;

            let tf = pair_count / source_total;
            let idf = (total_entities / (1.0 + source_pairs)).ln();
            let weight =
                (TFIDF_WEIGHT * tf * idf + (1.0 - TFIDF_WEIGHT) * relation.weight).clamp(0.0, 1.0);
            if (weight - relation.weight).abs() > 0.001 {
                relation.weight = weight;
                changed += 1;
            }
        }

        tracing::info!(relations = self.relations.len(), changed, "relation weights recalculated");
        WeightUpdate {
            total: self.relations.len(),
            changed,
        }
    }

    /// Remove rarely mentioned entities idle for longer than the policy allows,
    /// together with every relation touching them. Returns the entity count removed.
    pub fn prune(&mut self, policy: &GraphPruneConfig, now: DateTime<Utc>) -> usize {
        let idle_cutoff = now - Duration::days(policy.max_idle_days);
        let doomed: BTreeSet<String> = self
            .entities
            .values()
            .filter(|e| e.mentions < policy.min_mentions && e.last_accessed < idle_cutoff)
            .map(|e| e.id.clone())
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        for id in &doomed {
            if let Some(entity) = self.entities.remove(id) {
                self.name_index.remove(&entity.name.to_lowercase());
            }
            self.entity_mentions.remove(id);
            self.relation_index.remove(id);
            if let Some(neighbors) = self.adjacency.remove(id) {
                for neighbor in neighbors {
                    if let Some(set) = self.adjacency.get_mut(&neighbor) {
                        set.remove(id);
                    }
                }
            }
        }
        self.relations
            .retain(|_, r| !doomed.contains(&r.source_id) && !doomed.contains(&r.target_id));
        let relations = &self.relations;
        for ids in self.relation_index.values_mut() {
            ids.retain(|r| relations.contains_key(r));
        }
        self.cooccurrence
            .retain(|(a, b), _| !doomed.contains(a) && !doomed.contains(b));
        self.adjacency.retain(|_, set| !set.is_empty());

        tracing::info!(pruned = doomed.len(), remaining = self.entities.len(), "graph pruned");
        doomed.len()
    }

    pub fn stats(&self) -> GraphStats {
        let mut entity_types = BTreeMap::new();
        for e in self.entities.values() {
            *entity_types.entry(e.entity_type.clone()).or_insert(0) += 1;
        }
        let mut relation_types = BTreeMap::new();
        for r in self.relations.values() {
            *relation_types.entry(r.relation_type.clone()).or_insert(0) += 1;
        }
        let edges: usize = self.adjacency.values().map(BTreeSet::len).sum();
        GraphStats {
            total_entities: self.entities.len(),
            total_relations: self.relations.len(),
            entity_types,
            relation_types,
            avg_connections: edges as f64 / self.adjacency.len().max(1) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn graph_with(names: &[&str], edges: &[(&str, &str)]) -> KnowledgeGraph {
        let mut g = KnowledgeGraph::new();
        for name in names {
            g.add_entity(Entity::new(name, "person", now()), now());
        }
        for (a, b) in edges {
            g.add_relation(Relation::new(a, b, "knows", now()), now());
        }
        g
    }

    #[test]
    fn test_entity_upsert_merges() {
        let mut g = KnowledgeGraph::new();
        let first = g.add_entity(Entity::new("New  York", "concept", now()), now());
        let mut again = Entity::new("new york", "place", now());
        again
            .properties
            .insert("country".into(), serde_json::json!("US"));
        let second = g.add_entity(again, now());

        assert_eq!(first.as_deref(), Some("new_york"));
        assert_eq!(first, second);
        let e = g.entity("new_york").unwrap();
        assert_eq!(e.name, "New York");
        assert_eq!(e.mentions, 2);
        assert_eq!(e.entity_type, "place");
        assert_eq!(e.properties["country"], "US");
    }

    #[test]
    fn test_specific_type_not_downgraded() {
        let mut g = KnowledgeGraph::new();
        g.add_entity(Entity::new("Rust", "tool", now()), now());
        g.add_entity(Entity::new("Rust", "concept", now()), now());
        assert_eq!(g.entity("rust").unwrap().entity_type, "tool");
    }

    #[test]
    fn test_stopword_concept_rejected() {
        let mut g = KnowledgeGraph::new();
        assert!(g.add_entity(Entity::new("Thing", "concept", now()), now()).is_none());
        assert!(g.add_entity(Entity::new("것", "concept", now()), now()).is_none());
        assert!(g.add_entity(Entity::new("   ", "person", now()), now()).is_none());
        assert!(g.is_empty());
    }

    #[test]
    fn test_relation_requires_endpoints() {
        let mut g = graph_with(&["Alice"], &[]);
        assert!(g.add_relation(Relation::new("alice", "bob", "knows", now()), now()).is_none());
        assert_eq!(g.relation_count(), 0);
        assert_eq!(g.degree("alice"), 0);
    }

    #[test]
    fn test_repeat_relation_strengthens() {
        let mut g = graph_with(&["Alice", "Bob"], &[("alice", "bob"), ("alice", "bob")]);
        assert_eq!(g.relation_count(), 1);
        let r = g.relations().next().unwrap();
        assert!((r.weight - 1.1).abs() < 1e-9);
        let doc = g.to_document();
        assert_eq!(doc.cooccurrence.get("alice|bob"), Some(&1));
        assert_eq!(doc.entity_mentions.get("bob"), Some(&1));
        g.add_relation(Relation::new("bob", "alice", "knows", now()), now());
        assert_eq!(g.relation_count(), 2);
        assert_eq!(g.degree("alice"), 1);
    }

    #[test]
    fn test_neighbors_depth() {
        let g = graph_with(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "d")]);
        assert!(g.neighbors("a", 0).is_empty());
        assert_eq!(g.neighbors("a", 1), BTreeSet::from(["b".to_string()]));
        assert_eq!(
            g.neighbors("a", 2),
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
        // Undirected: the target sees its source.
        assert!(g.neighbors("d", 1).contains("c"));
        assert!(g.neighbors("zzz", 3).is_empty());
    }

    #[test]
    fn test_find_path() {
        let g = graph_with(&["a", "b", "c", "d", "e"], &[("a", "b"), ("b", "c"), ("c", "d")]);
        assert_eq!(g.find_path("a", "a", 3), vec!["a"]);
        assert_eq!(g.find_path("a", "c", 3), vec!["a", "b", "c"]);
        assert_eq!(g.find_path("d", "a", 3), vec!["d", "c", "b", "a"]);
        assert!(g.find_path("a", "d", 2).is_empty());
        assert!(g.find_path("a", "e", 5).is_empty());
        assert!(g.find_path("a", "nope", 5).is_empty());
    }

    #[test]
    fn test_document_roundtrip_rebuilds_indexes() {
        let g = graph_with(&["Alice", "Bob", "Carol"], &[("alice", "bob"), ("alice", "bob"), ("bob", "carol")]);
        let json = serde_json::to_string(&g.to_document()).unwrap();
        let restored = KnowledgeGraph::from_document(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.entity_count(), 3);
        assert_eq!(restored.relation_count(), 2);
        assert_eq!(restored.neighbors("alice", 2).len(), 2);
        assert_eq!(restored.relations_for_entity("bob").len(), 2);
        assert_eq!(restored.to_document().cooccurrence, g.to_document().cooccurrence);
    }

    #[test]
    fn test_from_document_drops_dangling_relation() {
        let doc = GraphDocument {
            entities: vec![Entity::new("Alice", "person", now())],
            relations: vec![Relation::new("alice", "ghost", "knows", now())],
            ..Default::default()
        };
        let g = KnowledgeGraph::from_document(doc);
        assert_eq!(g.relation_count(), 0);
    }

    #[test]
    fn test_recalculate_weights_bounded() {
        let mut g = graph_with(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "b"), ("a", "b"), ("c", "d")],
        );
        let update = g.recalculate_weights();
        assert_eq!(update.total, 2);
        assert!(update.changed >= 1);
        assert!(g.relations().all(|r| (0.0..=1.0).contains(&r.weight)));
    }

    #[test]
    fn test_connections_for_text() {
        let g = graph_with(&["Alice", "Bob", "Carol"], &[("alice", "bob"), ("alice", "carol")]);
        assert_eq!(g.connections_for_text("I met alice yesterday"), 2);
        assert_eq!(g.connections_for_text("Alice and Bob"), 3);
        assert_eq!(g.connections_for_text("nobody here"), 0);
    }

    #[test]
    fn test_prune_removes_idle_rare_entities() {
        let mut g = graph_with(&["Alice", "Bob", "Carol"], &[("alice", "bob"), ("bob", "carol")]);
        g.add_entity(Entity::new("Bob", "person", now()), now());
        let later = now() + Duration::days(120);
        let policy = GraphPruneConfig {
            enabled: true,
            min_mentions: 2,
            max_idle_days: 90,
        };

        assert_eq!(g.prune(&policy, later), 2);
        assert_eq!(g.entity_count(), 1);
        assert_eq!(g.relation_count(), 0);
        assert_eq!(g.degree("bob"), 0);
        assert!(g.relations_for_entity("bob").is_empty());
        assert_eq!(g.prune(&policy, now()), 0);
    }

    #[test]
    fn test_stats() {
        let g = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let stats = g.stats();
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.total_relations, 2);
        assert_eq!(stats.entity_types.get("person"), Some(&3));
        assert_eq!(stats.relation_types.get("knows"), Some(&2));
        assert!((stats.avg_connections - 4.0 / 3.0).abs() < 1e-9);
    }
}
