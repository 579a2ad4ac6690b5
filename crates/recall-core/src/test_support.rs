//! Deterministic test doubles shared by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use recall_types::error::{ProviderError, RepositoryError};
use recall_types::memory::{IndexFilter, IndexHit, MemoryRecord, RecordPatch};
use recall_types::session::SessionSummary;
use uuid::Uuid;

use crate::llm::generator::Generator;
use crate::memory::embedder::{Embedder, TaskType};
use crate::memory::index::VectorIndex;
use crate::storage::archive::SessionArchive;
use crate::storage::document::DocumentStore;

pub const DIM: usize = 64;

/// Bag-of-words embedder: each lowercased token bumps one hashed bucket.
/// Identical texts embed identically; texts sharing words are close.
#[derive(Default)]
pub struct WordEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl WordEmbedder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

pub fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for token in text.to_lowercase().split_whitespace() {
        let bucket = token
            .bytes()
            .fold(7u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        v[(bucket % DIM as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

impl Embedder for WordEmbedder {
    async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Unavailable("embedder down".into()));
        }
        Ok(word_vector(text))
    }

    fn model_name(&self) -> &str {
        "word-test"
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}

/// Brute-force cosine index over a `Vec`.
#[derive(Default)]
pub struct MemoryIndex {
    pub rows: Mutex<Vec<(MemoryRecord, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }
}

impl VectorIndex for MemoryIndex {
    async fn add(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .unwrap()
            .push((record.clone(), vector.to_vec()));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<IndexHit> = rows
            .iter()
            .filter(|(r, _)| filter.matches(r))
            .map(|(r, v)| IndexHit {
                record: r.clone(),
                similarity: cosine(vector, v),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    async fn update(&self, id: &Uuid, patch: &RecordPatch) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|(r, _)| &r.id == id)
            .ok_or(RepositoryError::NotFound)?;
        patch.apply(&mut row.0);
        Ok(())
    }

    async fn batch_update(&self, patches: &[(Uuid, RecordPatch)]) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let mut applied = 0;
        for (id, patch) in patches {
            if let Some(row) = rows.iter_mut().find(|(r, _)| &r.id == id) {
                patch.apply(&mut row.0);
                applied += 1;
            }
        }
        Ok(applied)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(r, _)| !ids.contains(&r.id));
        Ok(before - rows.len())
    }

    async fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|(r, _)| filter.matches(r))
            .map(|(r, _)| r.clone())
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.rows.lock().unwrap().len())
    }
}

/// Generator that answers prompts from a queue, or by first matching
/// substring rule, and records every prompt it saw.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    pub rules: Vec<(String, String)>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replies<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
        Self {
            queue: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            queue: Mutex::new(VecDeque::from(vec![Err(ProviderError::Timeout); 8])),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some((_, reply)) = self.rules.iter().find(|(n, _)| prompt.contains(n.as_str())) {
            return Ok(reply.clone());
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }
}

/// Single-slot document store.
pub struct MemoryDocument<T> {
    pub doc: Mutex<Option<T>>,
    pub saves: AtomicUsize,
}

impl<T> Default for MemoryDocument<T> {
    fn default() -> Self {
        Self {
            doc: Mutex::new(None),
            saves: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone + Send + Sync> DocumentStore<T> for MemoryDocument<T> {
    async fn load(&self) -> Result<Option<T>, RepositoryError> {
        Ok(self.doc.lock().unwrap().clone())
    }

    async fn save(&self, document: &T) -> Result<(), RepositoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.doc.lock().unwrap() = Some(document.clone());
        Ok(())
    }
}

/// Shared handle so tests can inspect a store after boxing it.
pub struct Shared<T>(pub std::sync::Arc<T>);

impl<T: VectorIndex> VectorIndex for Shared<T> {
    async fn add(&self, record: &MemoryRecord, vector: &[f32]) -> Result<(), RepositoryError> {
        self.0.add(record, vector).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexHit>, RepositoryError> {
        self.0.query(vector, k, filter).await
    }

    async fn update(&self, id: &Uuid, patch: &RecordPatch) -> Result<(), RepositoryError> {
        self.0.update(id, patch).await
    }

    async fn batch_update(&self, patches: &[(Uuid, RecordPatch)]) -> Result<usize, RepositoryError> {
        self.0.batch_update(patches).await
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize, RepositoryError> {
        self.0.delete(ids).await
    }

    async fn get(
        &self,
        filter: &IndexFilter,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.0.get(filter, limit).await
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        self.0.count().await
    }
}

impl<T: Generator> Generator for Shared<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.0.generate(prompt).await
    }
}

impl<D: Send + Sync, T: DocumentStore<D>> DocumentStore<D> for Shared<T> {
    async fn load(&self) -> Result<Option<D>, RepositoryError> {
        self.0.load().await
    }

    async fn save(&self, document: &D) -> Result<(), RepositoryError> {
        self.0.save(document).await
    }
}

/// Archive kept in a `Vec`, rendered without truncation.
#[derive(Default)]
pub struct MemoryArchive {
    pub sessions: Mutex<Vec<SessionSummary>>,
}

impl SessionArchive for MemoryArchive {
    async fn archive(&self, summary: SessionSummary) -> Result<(), RepositoryError> {
        self.sessions.lock().unwrap().push(summary);
        Ok(())
    }

    async fn recent_summaries(&self, limit: usize, _max_chars: usize) -> Result<String, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .rev()
            .take(limit)
            .map(SessionSummary::render)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    async fn sessions_by_date(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        _max_chars: usize,
    ) -> Result<String, RepositoryError> {
        let to = to.unwrap_or(from);
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| {
                let day = s.started_at.date_naive();
                day >= from && day <= to
            })
            .take(limit)
            .map(SessionSummary::render)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    async fn last_session_end(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.sessions.lock().unwrap().iter().map(|s| s.ended_at).max())
    }
}

impl<T: SessionArchive> SessionArchive for Shared<T> {
    async fn archive(&self, summary: SessionSummary) -> Result<(), RepositoryError> {
        self.0.archive(summary).await
    }

    async fn recent_summaries(&self, limit: usize, max_chars: usize) -> Result<String, RepositoryError> {
        self.0.recent_summaries(limit, max_chars).await
    }

    async fn sessions_by_date(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> Result<String, RepositoryError> {
        self.0.sessions_by_date(from, to, limit, max_chars).await
    }

    async fn last_session_end(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.0.last_session_end().await
    }
}

/// Count of rows per content key, for invariant checks.
pub fn keys_histogram(records: &[MemoryRecord]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for r in records {
        *map.entry(r.content_key.clone()).or_insert(0) += 1;
    }
    map
}
