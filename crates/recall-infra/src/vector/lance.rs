//! LanceDB-backed vector index for episodic memory.
//!
//! `LanceVectorStore` wraps a `lancedb::Connection` and handles table
//! lifecycle; `LanceVectorIndex` implements `VectorIndex` over one table
//! using cosine distance search with SQL filters pushed down to LanceDB.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Float64Array, Int32Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use uuid::Uuid;

use recall_core::memory::index::VectorIndex;
use recall_types::error::RepositoryError;
use recall_types::memory::{IndexFilter, IndexHit, MemoryRecord, MemoryType, RecordPatch};

use super::schema::{memory_schema, MEMORY_TABLE};

/// LanceDB connection and table management.
pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB vector store at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;

        Ok(Self { db, base_path })
    }

    /// Ensure a table exists with the given schema, opening it if present.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn table_exists(&self, table_name: &str) -> bool {
        self.db.open_table(table_name).execute().await.is_ok()
    }

    /// Drop a table. Idempotent.
    pub async fn drop_table(&self, table_name: &str) -> Result<(), lancedb::Error> {
        match self.db.drop_table(table_name, &[]).await {
            Ok(()) => Ok(()),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// [`VectorIndex`] over the LanceDB episodic memory table.
pub struct LanceVectorIndex {
    table: lancedb::Table,
    dimension: i32,
}

impl LanceVectorIndex {
    /// Open (or create) the memory table for vectors of `dimension`.
    pub async fn open(store: &LanceVectorStore, dimension: usize) -> Result<Self, RepositoryError> {
        let dimension = i32::try_from(dimension)
            .map_err(|_| RepositoryError::Query(format!("dimension {dimension} out of range")))?;
        let table = store
            .ensure_table(MEMORY_TABLE, Arc::new(memory_schema(dimension)))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure memory table: {e}")))?;
        Ok(Self { table, dimension })
    }

    /// Build an Arrow RecordBatch holding one record and its embedding.
    fn build_record_batch(&self, record: &MemoryRecord, vector: &[f32]) -> Result<RecordBatch, RepositoryError> {
        if vector.len() != self.dimension as usize {
            return Err(RepositoryError::Query(format!(
                "vector has {} dimensions, table expects {}",
                vector.len(),
                self.dimension
            )));
        }
        let schema = Arc::new(memory_schema(self.dimension));

        let topics = serde_json::to_string(&record.topics)
            .map_err(|e| RepositoryError::Query(format!("Failed to encode topics: {e}")))?;
        let provenance = serde_json::to_string(&record.provenance)
            .map_err(|e| RepositoryError::Query(format!("Failed to encode provenance: {e}")))?;

        let values = Float32Array::from(vector.to_vec());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(field, self.dimension, Arc::new(values), None);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![record.id.to_string()])),
                Arc::new(StringArray::from(vec![record.content.clone()])),
                Arc::new(StringArray::from(vec![record.memory_type.to_string()])),
                Arc::new(Float64Array::from(vec![record.importance])),
                Arc::new(Int32Array::from(vec![record.repetitions as i32])),
                Arc::new(Int32Array::from(vec![record.access_count as i32])),
                Arc::new(StringArray::from(vec![record.created_at.to_rfc3339()])),
                Arc::new(StringArray::from(vec![record.last_accessed.to_rfc3339()])),
                Arc::new(StringArray::from(vec![record.event_timestamp.map(|t| t.to_rfc3339())])),
                Arc::new(StringArray::from(vec![record.memory_date().to_string()])),
                Arc::new(StringArray::from(vec![record.content_key.clone()])),
                Arc::new(BooleanArray::from(vec![record.preserved])),
                Arc::new(StringArray::from(vec![topics])),
                Arc::new(StringArray::from(vec![provenance])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    async fn exists(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let rows = self
            .table
            .count_rows(Some(format!("id = '{id}'")))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        Ok(rows > 0)
    }
}

/// Quote a string literal for a LanceDB SQL filter.
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Translate an [`IndexFilter`] into a SQL predicate, `None` when unconstrained.
fn filter_sql(filter: &IndexFilter) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(t) = filter.memory_type {
        clauses.push(format!("memory_type = {}", sql_quote(&t.to_string())));
    }
    if let Some(from) = filter.date_from {
        clauses.push(format!("memory_date >= '{from}'"));
    }
    if let Some(before) = filter.date_before {
        clauses.push(format!("memory_date < '{before}'"));
    }
    if let Some(key) = &filter.content_key {
        clauses.push(format!("content_key = {}", sql_quote(key)));
    }
    if filter.exclude_preserved {
        clauses.push("preserved = false".to_string());
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// SQL assignments for the set fields of a patch.
fn patch_columns(patch: &RecordPatch) -> Vec<(&'static str, String)> {
    let mut columns = Vec::new();
    if let Some(v) = patch.importance {
        columns.push(("importance", format!("{v:?}")));
    }
    if let Some(v) = patch.repetitions {
        columns.push(("repetitions", v.to_string()));
    }
    if let Some(v) = patch.access_count {
        columns.push(("access_count", v.to_string()));
    }
    if let Some(v) = patch.last_accessed {
        columns.push(("last_accessed", sql_quote(&v.to_rfc3339())));
    }
    if let Some(v) = patch.preserved {
        columns.push(("preserved", v.to_string()));
    }
    columns
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RepositoryError::Corrupt(format!("column '{name}' missing or mistyped")))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt(format!("bad timestamp '{value}': {e}")))
}

/// Decode Arrow rows into records. The vector column is ignored.
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<MemoryRecord>, RepositoryError> {
    let ids = column::<StringArray>(batch, "id")?;
    let contents = column::<StringArray>(batch, "content")?;
    let types = column::<StringArray>(batch, "memory_type")?;
    let importance = column::<Float64Array>(batch, "importance")?;
    let repetitions = column::<Int32Array>(batch, "repetitions")?;
    let access = column::<Int32Array>(batch, "access_count")?;
    let created = column::<StringArray>(batch, "created_at")?;
    let accessed = column::<StringArray>(batch, "last_accessed")?;
    let events = column::<StringArray>(batch, "event_timestamp")?;
    let keys = column::<StringArray>(batch, "content_key")?;
    let preserved = column::<BooleanArray>(batch, "preserved")?;
    let topics = column::<StringArray>(batch, "topics")?;
    let provenance = column::<StringArray>(batch, "provenance")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = Uuid::parse_str(ids.value(i))
            .map_err(|e| RepositoryError::Corrupt(format!("bad id '{}': {e}", ids.value(i))))?;
        let memory_type: MemoryType = types.value(i).parse().map_err(RepositoryError::Corrupt)?;
        let event_timestamp = if events.is_null(i) {
            None
        } else {
            Some(parse_time(events.value(i))?)
        };
        records.push(MemoryRecord {
            id,
            content: contents.value(i).to_string(),
            memory_type,
            importance: importance.value(i),
            repetitions: repetitions.value(i).max(0) as u32,
            access_count: access.value(i).max(0) as u32,
            created_at: parse_time(created.value(i))?,
            last_accessed: parse_time(accessed.value(i))?,
            event_timestamp,
            content_key: keys.value(i).to_string(),
            preserved: preserved.value(i),
            topics: serde_json::from_str(topics.value(i))
                .map_err(|e| RepositoryError::Corrupt(format!("bad topics: {e}")))?,
            provenance: serde_json::from_str(provenance.value(i))
                .map_err(|e| RepositoryError::Corrupt(format!("bad provenance: {e}")))?,
        });
    }
    Ok(records)
}

impl VectorIndex for LanceVectorIndex {
    async fn add(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), RepositoryError> {
        if self.exists(&record.id).await? {
            return Err(RepositoryError::Conflict(format!("record {} already exists", record.id)));
        }
        let batch = self.build_record_batch(record, vector)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add memory: {e}")))?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, RepositoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut search = self
            .table
            .vector_search(vector)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(sql) = filter_sql(filter) {
            search = search.only_if(sql);
        }
        let stream = search
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut hits = Vec::new();
        for batch in batches {
            if batch.num_rows() == 0 {
                continue;
            }
            // The _distance column is added by LanceDB vector search.
            let distances = column::<Float32Array>(&batch, "_distance")?;
            for (i, record) in batch_to_records(&batch)?.into_iter().enumerate() {
                hits.push(IndexHit {
                    record,
                    similarity: 1.0 - distances.value(i) as f64,
                });
            }
        }
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    async fn update(&self, id: &Uuid, patch: &RecordPatch) -> Result<(), RepositoryError> {
        if !self.exists(id).await? {
            return Err(RepositoryError::NotFound);
        }
        let columns = patch_columns(patch);
        if columns.is_empty() {
            return Ok(());
        }
        let mut update = self.table.update().only_if(format!("id = '{id}'"));
        for (name, value) in columns {
            update = update.column(name, value);
        }
        update
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to update memory: {e}")))?;
        Ok(())
    }

    async fn batch_update(&self, patches: &[(Uuid, RecordPatch)]) -> Result<usize, RepositoryError> {
        let mut applied = 0;
        for (id, patch) in patches {
            match self.update(id, patch).await {
                Ok(()) => applied += 1,
                Err(RepositoryError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(error = %e, %id, "access update failed");
                }
            }
        }
        Ok(applied)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let list = ids
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = format!("id IN ({list})");
        let matched = self
            .table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        self.table
            .delete(&predicate)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to delete memories: {e}")))?;
        Ok(matched)
    }

    async fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let mut query = self.table.query();
        if let Some(sql) = filter_sql(filter) {
            query = query.only_if(sql);
        }
        if let Some(n) = limit {
            query = query.limit(n);
        }
        let stream = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to query memories: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut records = Vec::new();
        for batch in batches {
            records.extend(batch_to_records(&batch)?);
        }
        Ok(records)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use recall_types::memory::{MemoryProvenance, PromotionReason};

    const DIM: usize = 4;

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
            topics: vec!["misc".into()],
            provenance: MemoryProvenance::Episodic {
                source_session: Some("s1".into()),
                promotion_reason: PromotionReason::Importance,
            },
        }
    }

    async fn open_index() -> (tempfile::TempDir, LanceVectorIndex) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = LanceVectorStore::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create vector store");
        let index = LanceVectorIndex::open(&store, DIM).await.expect("Failed to open index");
        (temp_dir, index)
    }

    #[test]
    fn test_filter_sql() {
        assert_eq!(filter_sql(&IndexFilter::default()), None);
        let filter = IndexFilter {
            memory_type: Some(MemoryType::Fact),
            date_from: NaiveDate::from_ymd_opt(2024, 6, 1),
            date_before: NaiveDate::from_ymd_opt(2024, 6, 2),
            content_key: Some("it's".into()),
            exclude_preserved: true,
        };
        assert_eq!(
            filter_sql(&filter).unwrap(),
            "memory_type = 'fact' AND memory_date >= '2024-06-01' AND memory_date < '2024-06-02' \
             AND content_key = 'it''s' AND preserved = false"
        );
    }

    #[test]
    fn test_patch_columns() {
        let patch = RecordPatch {
            importance: Some(0.25),
            preserved: Some(true),
            ..Default::default()
        };
        assert_eq!(
            patch_columns(&patch),
            vec![("importance", "0.25".to_string()), ("preserved", "true".to_string())]
        );
    }

    #[tokio::test]
    async fn test_connection_and_table_creation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = LanceVectorStore::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create vector store");
        assert!(store.table_names().await.expect("Failed to list tables").is_empty());

        LanceVectorIndex::open(&store, DIM).await.expect("Failed to open index");
        assert!(store.table_exists(MEMORY_TABLE).await);

        store.drop_table(MEMORY_TABLE).await.expect("drop");
        store.drop_table(MEMORY_TABLE).await.expect("drop is idempotent");
    }

    #[tokio::test]
    async fn test_add_query_roundtrip() {
        let (_dir, index) = open_index().await;
        let a = record("alpha note", MemoryType::Fact, 1);
        let b = record("beta note", MemoryType::Preference, 3);
        index.add(&a, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
        index.add(&b, &[0.0, 1.0, 0.0, 0.0]).await.unwrap();

        let hits = index
            .query(&[1.0, 0.1, 0.0, 0.0], 2, &IndexFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record, a);
        assert!(hits[0].similarity > hits[1].similarity);

        let facts = index
            .query(&[0.0, 1.0, 0.0, 0.0], 5, &IndexFilter::by_type(MemoryType::Fact))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].record.id, a.id);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let (_dir, index) = open_index().await;
        let a = record("alpha", MemoryType::Fact, 1);
        assert!(index.add(&a, &[1.0, 0.0]).await.is_err());
    }

    #[tokio::test]
    async fn test_update_delete_and_count() {
        let (_dir, index) = open_index().await;
        let a = record("alpha", MemoryType::Fact, 1);
        let b = record("beta", MemoryType::Fact, 9);
        index.add(&a, &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
        index.add(&b, &[0.0, 1.0, 0.0, 0.0]).await.unwrap();

        let patch = RecordPatch {
            repetitions: Some(3),
            preserved: Some(true),
            ..Default::default()
        };
        index.update(&a.id, &patch).await.unwrap();
        assert!(matches!(
            index.update(&Uuid::now_v7(), &patch).await,
            Err(RepositoryError::NotFound)
        ));

        let unpreserved = index
            .get(
                &IndexFilter {
                    exclude_preserved: true,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(unpreserved.len(), 1);
        assert_eq!(unpreserved[0].id, b.id);

        let by_date = index
            .get(
                &IndexFilter {
                    date_from: NaiveDate::from_ymd_opt(2024, 6, 5),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(by_date.len(), 1);

        assert_eq!(index.delete(&[a.id, Uuid::now_v7()]).await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
