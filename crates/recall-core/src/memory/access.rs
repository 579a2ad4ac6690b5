//! Deferred last-accessed bookkeeping.
//!
//! Reads record which memories they returned; the tracker batches those into
//! a single `batch_update` once enough are pending or enough time has passed,
//! so the hot query path never writes to the index itself.
//!
//! The tracker also keeps a per-process hit count for every id it has seen.
//! The most-read ids form the hot set that retrieval boosts.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use recall_types::config::AccessFlushConfig;
use recall_types::error::RepositoryError;
use recall_types::memory::RecordPatch;

use super::box_index::BoxVectorIndex;

#[derive(Debug, Clone, Copy)]
struct PendingAccess {
    access_count: u32,
    last_accessed: DateTime<Utc>,
}

#[derive(Debug)]
struct TrackerState {
    pending: HashMap<Uuid, PendingAccess>,
    hits: HashMap<Uuid, u64>,
    last_flush: DateTime<Utc>,
}

/// An id must have been returned at least this often to be hot.
const MIN_HOT_HITS: u64 = 2;

/// Buffers access updates until a count or time threshold is reached.
#[derive(Debug)]
pub struct AccessTracker {
    config: AccessFlushConfig,
    state: Mutex<TrackerState>,
}

impl AccessTracker {
    pub fn new(config: AccessFlushConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            state: Mutex::new(TrackerState {
                pending: HashMap::new(),
                hits: HashMap::new(),
                last_flush: now,
            }),
        }
    }

    /// Note that each `(id, stored_access_count)` was just returned by a read.
    pub fn record<I>(&self, hits: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = (Uuid, u32)>,
    {
        let mut state = self.lock();
        for (id, stored) in hits {
            let entry = state.pending.entry(id).or_insert(PendingAccess {
                access_count: stored,
                last_accessed: now,
            });
            entry.access_count = entry.access_count.saturating_add(1);
            entry.last_accessed = now;
            *state.hits.entry(id).or_insert(0) += 1;
        }
    }

    /// The `limit` most frequently returned ids, ignoring ids read only once.
    pub fn hot_ids(&self, limit: usize) -> HashSet<Uuid> {
        let state = self.lock();
        let mut ranked: Vec<(u64, Uuid)> = state
            .hits
            .iter()
            .filter(|(_, hits)| **hits >= MIN_HOT_HITS)
            .map(|(id, hits)| (*hits, *id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.into_iter().take(limit).map(|(_, id)| id).collect()
    }

    /// Drop hit counts for ids that no longer exist.
    pub fn forget<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        let mut state = self.lock();
        for id in ids {
            state.hits.remove(id);
            state.pending.remove(id);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether pending updates have crossed the count or interval threshold.
    pub fn should_flush(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        if state.pending.is_empty() {
            return false;
        }
        let interval = Duration::seconds(self.config.interval_secs as i64);
        state.pending.len() >= self.config.threshold || now - state.last_flush >= interval
    }

    /// Drain pending updates as index patches and restart the interval.
    pub fn take_pending(&self, now: DateTime<Utc>) -> Vec<(Uuid, RecordPatch)> {
        let mut state = self.lock();
        state.last_flush = now;
        state
            .pending
            .drain()
            .map(|(id, p)| {
                (
                    id,
                    RecordPatch {
                        access_count: Some(p.access_count),
                        last_accessed: Some(p.last_accessed),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    /// Discard pending updates without writing them.
    pub fn clear_pending(&self) {
        self.lock().pending.clear();
    }

    /// Write every pending update to `index`. Returns the number applied.
    #[tracing::instrument(name = "access_flush", skip(self, index))]
    pub async fn flush(
        &self,
        index: &BoxVectorIndex,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        let patches = self.take_pending(now);
        if patches.is_empty() {
            return Ok(0);
        }
        let updated = index.batch_update(&patches).await?;
        if updated < patches.len() {
            tracing::warn!(
                failed = patches.len() - updated,
                total = patches.len(),
                "some access updates were not applied"
            );
        }
        tracing::debug!(updated, "access updates flushed");
        Ok(updated)
    }

    /// Flush only when a threshold has been crossed.
    pub async fn maybe_flush(
        &self,
        index: &BoxVectorIndex,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        if self.should_flush(now) {
            self.flush(index, now).await
        } else {
            Ok(0)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn tracker(threshold: usize) -> AccessTracker {
        AccessTracker::new(
            AccessFlushConfig {
                threshold,
                interval_secs: 300,
                ..Default::default()
            },
            t0(),
        )
    }

    #[test]
    fn test_threshold_triggers_flush() {
        let t = tracker(2);
        t.record([(Uuid::now_v7(), 0)], t0());
        assert!(!t.should_flush(t0()));
        t.record([(Uuid::now_v7(), 0)], t0());
        assert!(t.should_flush(t0()));
    }

    #[test]
    fn test_interval_triggers_flush() {
        let t = tracker(50);
        t.record([(Uuid::now_v7(), 0)], t0());
        assert!(!t.should_flush(t0() + Duration::seconds(299)));
        assert!(t.should_flush(t0() + Duration::seconds(300)));
    }

    #[test]
    fn test_empty_never_flushes() {
        let t = tracker(1);
        assert!(!t.should_flush(t0() + Duration::days(1)));
    }

    #[test]
    fn test_repeated_reads_accumulate() {
        let t = tracker(50);
        let id = Uuid::now_v7();
        t.record([(id, 4)], t0());
        t.record([(id, 4)], t0() + Duration::seconds(5));

        let patches = t.take_pending(t0() + Duration::seconds(6));
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].1.access_count, Some(6));
        assert_eq!(
            patches[0].1.last_accessed,
            Some(t0() + Duration::seconds(5))
        );
        assert_eq!(t.pending_count(), 0);
    }

    #[test]
    fn test_take_pending_restarts_interval() {
        let t = tracker(50);
        t.record([(Uuid::now_v7(), 0)], t0());
        t.take_pending(t0() + Duration::seconds(400));
        t.record([(Uuid::now_v7(), 0)], t0() + Duration::seconds(401));
        assert!(!t.should_flush(t0() + Duration::seconds(500)));
    }

    #[test]
    fn test_hot_ids_rank_by_hits() {
        let t = tracker(50);
        let (busy, warm, once) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        for _ in 0..3 {
            t.record([(busy, 0)], t0());
        }
        t.record([(warm, 0), (once, 0)], t0());
        t.record([(warm, 0)], t0());

        let hot = t.hot_ids(1);
        assert_eq!(hot, HashSet::from([busy]));
        let hot = t.hot_ids(10);
        assert!(hot.contains(&warm));
        assert!(!hot.contains(&once));
    }

    #[test]
    fn test_hits_survive_flush_until_forgotten() {
        let t = tracker(50);
        let id = Uuid::now_v7();
        t.record([(id, 0)], t0());
        t.record([(id, 0)], t0());
        t.take_pending(t0());
        assert!(t.hot_ids(5).contains(&id));

        t.forget([&id]);
        assert!(t.hot_ids(5).is_empty());
    }
}
