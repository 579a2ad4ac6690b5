//! In-memory vector index.
//!
//! Brute-force cosine search over a `DashMap`. Used for `--ephemeral` runs
//! and as a reference implementation of the index contract.

use dashmap::DashMap;
use uuid::Uuid;

use recall_core::memory::index::VectorIndex;
use recall_types::error::RepositoryError;
use recall_types::memory::{IndexFilter, IndexHit, MemoryRecord, RecordPatch};

use super::cosine_similarity;

/// Non-persistent [`VectorIndex`].
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    rows: DashMap<Uuid, (MemoryRecord, Vec<f32>)>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), RepositoryError> {
        if self.rows.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(format!("record {} already exists", record.id)));
        }
        self.rows.insert(record.id, (record.clone(), vector.to_vec()));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, RepositoryError> {
        let mut hits: Vec<IndexHit> = self
            .rows
            .iter()
            .filter(|entry| filter.matches(&entry.value().0))
            .map(|entry| {
                let (record, stored) = entry.value();
                IndexHit {
                    record: record.clone(),
                    similarity: cosine_similarity(vector, stored),
                }
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    async fn update(&self, id: &Uuid, patch: &RecordPatch) -> Result<(), RepositoryError> {
        let mut row = self.rows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        patch.apply(&mut row.0);
        Ok(())
    }

    async fn batch_update(&self, patches: &[(Uuid, RecordPatch)]) -> Result<usize, RepositoryError> {
        let mut applied = 0;
        for (id, patch) in patches {
            if let Some(mut row) = self.rows.get_mut(id) {
                patch.apply(&mut row.0);
                applied += 1;
            }
        }
        Ok(applied)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        Ok(ids.iter().filter(|id| self.rows.remove(*id).is_some()).count())
    }

    async fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        Ok(self
            .rows
            .iter()
            .filter(|entry| filter.matches(&entry.value().0))
            .map(|entry| entry.value().0.clone())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use recall_types::memory::{MemoryProvenance, MemoryType, PromotionReason};

    fn record(content: &str, memory_type: MemoryType, day: u32) -> MemoryRecord {
        let at = Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap();
        MemoryRecord {
            id: Uuid::now_v7(),
            content: content.into(),
            memory_type,
            importance: 0.5,
            repetitions: 1,
            access_count: 0,
            created_at: at,
            last_accessed: at,
            event_timestamp: Some(at),
            content_key: content.to_lowercase(),
            preserved: false,
            topics: vec![],
            provenance: MemoryProvenance::Episodic {
                source_session: None,
                promotion_reason: PromotionReason::Importance,
            },
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine_and_filters() {
        let index = InMemoryVectorIndex::new();
        let a = record("alpha", MemoryType::Fact, 1);
        let b = record("beta", MemoryType::Preference, 2);
        index.add(&a, &[1.0, 0.0]).await.unwrap();
        index.add(&b, &[0.6, 0.8]).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 5, &IndexFilter::default()).await.unwrap();
        assert_eq!(hits[0].record.id, a.id);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert!((hits[1].similarity - 0.6).abs() < 1e-6);

        let prefs = index
            .query(&[1.0, 0.0], 5, &IndexFilter::by_type(MemoryType::Preference))
            .await
            .unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].record.id, b.id);
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let index = InMemoryVectorIndex::new();
        let a = record("alpha", MemoryType::Fact, 1);
        index.add(&a, &[1.0]).await.unwrap();
        assert!(matches!(index.add(&a, &[1.0]).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_and_batch_update() {
        let index = InMemoryVectorIndex::new();
        let a = record("alpha", MemoryType::Fact, 1);
        index.add(&a, &[1.0]).await.unwrap();

        let patch = RecordPatch {
            preserved: Some(true),
            ..Default::default()
        };
        index.update(&a.id, &patch).await.unwrap();
        assert!(matches!(
            index.update(&Uuid::now_v7(), &patch).await,
            Err(RepositoryError::NotFound)
        ));

        let applied = index
            .batch_update(&[
                (
                    a.id,
                    RecordPatch {
                        access_count: Some(4),
                        ..Default::default()
                    },
                ),
                (Uuid::now_v7(), RecordPatch::default()),
            ])
            .await
            .unwrap();
        assert_eq!(applied, 1);
        let stored = index.get(&IndexFilter::default(), None).await.unwrap();
        assert!(stored[0].preserved);
        assert_eq!(stored[0].access_count, 4);
    }

    #[tokio::test]
    async fn test_get_filters_dates_and_deletes() {
        let index = InMemoryVectorIndex::new();
        let early = record("early", MemoryType::Fact, 1);
        let late = record("late", MemoryType::Fact, 10);
        index.add(&early, &[1.0]).await.unwrap();
        index.add(&late, &[1.0]).await.unwrap();

        let filter = IndexFilter {
            date_from: chrono::NaiveDate::from_ymd_opt(2024, 6, 5),
            ..Default::default()
        };
        let found = index.get(&filter, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, late.id);

        assert_eq!(index.delete(&[early.id, Uuid::now_v7()]).await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
