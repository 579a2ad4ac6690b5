//! Episodic memory types for recall.
//!
//! These types model long-term memory records: promoted facts, preferences,
//! conversation snippets, and consolidated semantic knowledge, together with
//! the filters and patches the vector index understands.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Category of a memory record.
///
/// Drives the type-specific decay multiplier: facts fade slowest,
/// conversation snippets fastest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Conversation,
    Fact,
    Preference,
    Insight,
    Semantic,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Conversation => write!(f, "conversation"),
            MemoryType::Fact => write!(f, "fact"),
            MemoryType::Preference => write!(f, "preference"),
            MemoryType::Insight => write!(f, "insight"),
            MemoryType::Semantic => write!(f, "semantic"),
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemoryType::Conversation),
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "insight" => Ok(MemoryType::Insight),
            "semantic" => Ok(MemoryType::Semantic),
            other => Err(format!("invalid memory type: '{other}'")),
        }
    }
}

/// Why a candidate memory was accepted for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionReason {
    Forced,
    Importance,
    Repetition,
}

impl fmt::Display for PromotionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionReason::Forced => write!(f, "forced"),
            PromotionReason::Importance => write!(f, "importance"),
            PromotionReason::Repetition => write!(f, "repetition"),
        }
    }
}

/// Where a record came from. One variant per metadata shape, decoded once
/// at the index boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryProvenance {
    /// Promoted from a conversation turn.
    Episodic {
        source_session: Option<String>,
        promotion_reason: PromotionReason,
    },
    /// Generalized from a group of episodic records.
    Semantic {
        source_count: usize,
        topic: String,
        confidence: f64,
    },
    /// Derived from knowledge-graph entities.
    GraphDerived { entity_ids: Vec<String> },
}

/// A single long-term memory record.
///
/// At most one live record exists per `content_key`. The embedding vector is
/// owned by the index and never travels with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub content: String,
    pub memory_type: MemoryType,
    /// Importance in `0.0..=1.0`.
    pub importance: f64,
    /// Number of times this content has been observed (>= 1).
    pub repetitions: u32,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// When the remembered event happened, if different from `created_at`.
    pub event_timestamp: Option<DateTime<Utc>>,
    /// Normalized dedup fingerprint.
    pub content_key: String,
    /// Exempt from eviction once set.
    #[serde(default)]
    pub preserved: bool,
    #[serde(default)]
    pub topics: Vec<String>,
    pub provenance: MemoryProvenance,
}

impl MemoryRecord {
    /// The calendar day the memory refers to (event time, else creation time).
    pub fn memory_date(&self) -> NaiveDate {
        self.event_timestamp.unwrap_or(self.created_at).date_naive()
    }

    /// Age in fractional hours relative to `now`, never negative.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = now.signed_duration_since(self.created_at).num_seconds();
        (secs.max(0) as f64) / 3600.0
    }
}

/// A record returned from a similarity query, with its ranking scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    /// Raw cosine similarity from the index.
    pub similarity: f64,
    /// Similarity after decay and temporal boosting.
    pub score: f64,
}

/// Raw nearest-neighbor hit as produced by a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub record: MemoryRecord,
    pub similarity: f64,
}

/// Constraints applied by the index before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
    pub memory_type: Option<MemoryType>,
    /// Inclusive lower bound on [`MemoryRecord::memory_date`].
    pub date_from: Option<NaiveDate>,
    /// Exclusive upper bound on [`MemoryRecord::memory_date`].
    pub date_before: Option<NaiveDate>,
    pub content_key: Option<String>,
    pub exclude_preserved: bool,
}

impl IndexFilter {
    pub fn by_type(memory_type: MemoryType) -> Self {
        Self {
            memory_type: Some(memory_type),
            ..Self::default()
        }
    }

    pub fn by_content_key(key: impl Into<String>) -> Self {
        Self {
            content_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Whether `record` satisfies every constraint of this filter.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(t) = self.memory_type {
            if record.memory_type != t {
                return false;
            }
        }
        if let Some(key) = &self.content_key {
            if &record.content_key != key {
                return false;
            }
        }
        if self.exclude_preserved && record.preserved {
            return false;
        }
        let date = record.memory_date();
        if let Some(from) = self.date_from {
            if date < from {
                return false;
            }
        }
        if let Some(before) = self.date_before {
            if date >= before {
                return false;
            }
        }
        true
    }
}

/// Partial metadata update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub importance: Option<f64>,
    pub repetitions: Option<u32>,
    pub access_count: Option<u32>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub preserved: Option<bool>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the set fields to `record` in place.
    pub fn apply(&self, record: &mut MemoryRecord) {
        if let Some(v) = self.importance {
            record.importance = v;
        }
        if let Some(v) = self.repetitions {
            record.repetitions = v;
        }
        if let Some(v) = self.access_count {
            record.access_count = v;
        }
        if let Some(v) = self.last_accessed {
            record.last_accessed = v;
        }
        if let Some(v) = self.preserved {
            record.preserved = v;
        }
    }
}

/// Outcome of the consolidation batch job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub checked: usize,
    pub deleted: usize,
    pub preserved: usize,
    pub surviving_updated: usize,
}

/// Outcome of budget-floor eviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub total: usize,
    pub candidates: usize,
    pub evicted: usize,
    pub dry_run: bool,
    /// Ids removed, or on a dry run the ids that would have been.
    pub evicted_ids: Vec<Uuid>,
    /// Entities removed by the optional graph prune pass.
    #[serde(default)]
    pub graph_entities_pruned: usize,
}

/// Outcome of episodic to semantic consolidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticReport {
    pub groups_considered: usize,
    pub created: usize,
    pub merged: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_record(date: DateTime<Utc>) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::now_v7(),
            content: "User likes green tea".to_string(),
            memory_type: MemoryType::Preference,
            importance: 0.7,
            repetitions: 1,
            access_count: 0,
            created_at: date,
            last_accessed: date,
            event_timestamp: None,
            content_key: "user likes green tea".to_string(),
            preserved: false,
            topics: vec!["tea".to_string()],
            provenance: MemoryProvenance::Episodic {
                source_session: None,
                promotion_reason: PromotionReason::Importance,
            },
        }
    }

    #[test]
    fn test_memory_type_roundtrip() {
        for t in [
            MemoryType::Conversation,
            MemoryType::Fact,
            MemoryType::Preference,
            MemoryType::Insight,
            MemoryType::Semantic,
        ] {
            let parsed: MemoryType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
        assert!("opinion".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_memory_type_default_is_conversation() {
        assert_eq!(MemoryType::default(), MemoryType::Conversation);
        let filter = IndexFilter::default();
        assert!(filter.memory_type.is_none());
    }

    #[test]
    fn test_provenance_serde_tag() {
        let p = MemoryProvenance::Semantic {
            source_count: 3,
            topic: "tea".into(),
            confidence: 0.8,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["kind"], "semantic");
        let back: MemoryProvenance = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_filter_date_bounds() {
        let day = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let record = make_record(day);
        let d = |m, dd| NaiveDate::from_ymd_opt(2024, m, dd).unwrap();

        let inside = IndexFilter {
            date_from: Some(d(1, 15)),
            date_before: Some(d(1, 16)),
            ..Default::default()
        };
        assert!(inside.matches(&record));

        let after = IndexFilter {
            date_from: Some(d(1, 16)),
            ..Default::default()
        };
        assert!(!after.matches(&record));

        let before = IndexFilter {
            date_before: Some(d(1, 15)),
            ..Default::default()
        };
        assert!(!before.matches(&record));
    }

    #[test]
    fn test_filter_event_timestamp_wins() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut record = make_record(created);
        record.event_timestamp = Some(Utc.with_ymd_and_hms(2024, 2, 10, 9, 0, 0).unwrap());
        assert_eq!(record.memory_date(), NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
    }

    #[test]
    fn test_filter_type_and_preserved() {
        let mut record = make_record(Utc::now());
        assert!(IndexFilter::by_type(MemoryType::Preference).matches(&record));
        assert!(!IndexFilter::by_type(MemoryType::Fact).matches(&record));

        record.preserved = true;
        let filter = IndexFilter {
            exclude_preserved: true,
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn test_patch_apply() {
        let mut record = make_record(Utc::now());
        let patch = RecordPatch {
            repetitions: Some(4),
            preserved: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut record);
        assert_eq!(record.repetitions, 4);
        assert!(record.preserved);
        assert_eq!(record.importance, 0.7);
        assert!(RecordPatch::default().is_empty());
    }
}
