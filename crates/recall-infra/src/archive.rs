//! File-backed session archive.
//!
//! All summaries live in one JSON document (see [`JsonFileStore`]), loaded
//! lazily on first use and rewritten whole on every append.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use recall_core::storage::archive::SessionArchive;
use recall_core::storage::document::DocumentStore;
use recall_types::error::RepositoryError;
use recall_types::session::SessionSummary;

use crate::document::JsonFileStore;

const BLOCK_SEPARATOR: &str = "\n\n";

/// On-disk shape of the archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveDocument {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

/// [`SessionArchive`] stored as a JSON file.
pub struct FileSessionArchive {
    store: JsonFileStore<ArchiveDocument>,
    cache: Mutex<Option<Vec<SessionSummary>>>,
}

impl FileSessionArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonFileStore::new(path),
            cache: Mutex::new(None),
        }
    }

    /// Loaded sessions, oldest first. A corrupt file is treated as empty.
    async fn sessions(&self) -> Result<Vec<SessionSummary>, RepositoryError> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache).await?.clone())
    }

    async fn loaded<'a>(
        &self,
        cache: &'a mut Option<Vec<SessionSummary>>,
    ) -> Result<&'a mut Vec<SessionSummary>, RepositoryError> {
        if cache.is_none() {
            let sessions = match self.store.load().await {
                Ok(doc) => doc.map(|d| d.sessions).unwrap_or_default(),
                Err(RepositoryError::Corrupt(e)) => {
                    tracing::warn!(error = %e, "session archive unreadable; starting empty");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            *cache = Some(sessions);
        }
        Ok(cache.get_or_insert_with(Vec::new))
    }
}

/// Join rendered blocks until `max_chars` would be exceeded. The first block
/// is always included, cut to `max_chars` when it alone is too long.
fn render_within<'a>(sessions: impl Iterator<Item = &'a SessionSummary>, max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for session in sessions {
        let block = session.render();
        let block_len = block.chars().count();
        if out.is_empty() {
            if block_len > max_chars {
                return block.chars().take(max_chars).collect();
            }
            out = block;
            used = block_len;
            continue;
        }
        let next = used + BLOCK_SEPARATOR.len() + block_len;
        if next > max_chars {
            break;
        }
        out.push_str(BLOCK_SEPARATOR);
        out.push_str(&block);
        used = next;
    }
    out
}

impl SessionArchive for FileSessionArchive {
    async fn archive(&self, summary: SessionSummary) -> Result<(), RepositoryError> {
        let mut cache = self.cache.lock().await;
        let mut sessions = self.loaded(&mut cache).await?.clone();
        sessions.push(summary);
        sessions.sort_by_key(|s| s.started_at);

        self.store
            .save(&ArchiveDocument {
                sessions: sessions.clone(),
            })
            .await?;
        *cache = Some(sessions);
        Ok(())
    }

    async fn recent_summaries(&self, limit: usize, max_chars: usize) -> Result<String, RepositoryError> {
        let sessions = self.sessions().await?;
        Ok(render_within(sessions.iter().rev().take(limit), max_chars))
    }

    async fn sessions_by_date(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> Result<String, RepositoryError> {
        let to = to.unwrap_or(from);
        let sessions = self.sessions().await?;
        let matching = sessions
            .iter()
            .filter(|s| {
                let day = s.started_at.date_naive();
                day >= from && day <= to
            })
            .take(limit);
        Ok(render_within(matching, max_chars))
    }

    async fn last_session_end(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.sessions().await?.iter().map(|s| s.ended_at).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn session(id: &str, day: u32, summary: &str) -> SessionSummary {
        let started_at = Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap();
        SessionSummary {
            session_id: id.into(),
            started_at,
            ended_at: started_at + chrono::Duration::minutes(30),
            message_count: 4,
            summary: summary.into(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_empty_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = FileSessionArchive::new(tmp.path().join("sessions.json"));
        assert_eq!(archive.recent_summaries(5, 1_000).await.unwrap(), "");
        assert_eq!(archive.last_session_end().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recent_newest_first_and_persisted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sessions.json");
        let archive = FileSessionArchive::new(&path);
        archive.archive(session("a", 1, "- first")).await.unwrap();
        archive.archive(session("b", 2, "- second")).await.unwrap();

        let reopened = FileSessionArchive::new(&path);
        let text = reopened.recent_summaries(5, 10_000).await.unwrap();
        assert!(text.find("- second").unwrap() < text.find("- first").unwrap());
        assert_eq!(
            reopened.last_session_end().await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 10, 30, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_recent_respects_limit_and_budget() {
        let tmp = TempDir::new().unwrap();
        let archive = FileSessionArchive::new(tmp.path().join("sessions.json"));
        for d in 1..=3 {
            archive.archive(session(&d.to_string(), d, "- something happened")).await.unwrap();
        }

        let one = archive.recent_summaries(1, 10_000).await.unwrap();
        assert_eq!(one.matches("(4 messages)").count(), 1);

        let single_len = session("x", 1, "- something happened").render().chars().count();
        let tight = archive.recent_summaries(3, single_len + 5).await.unwrap();
        assert_eq!(tight.matches("(4 messages)").count(), 1);

        let cut = archive.recent_summaries(3, 10).await.unwrap();
        assert_eq!(cut.chars().count(), 10);
    }

    #[tokio::test]
    async fn test_sessions_by_date_inclusive_range() {
        let tmp = TempDir::new().unwrap();
        let archive = FileSessionArchive::new(tmp.path().join("sessions.json"));
        archive.archive(session("a", 1, "- march first")).await.unwrap();
        archive.archive(session("b", 5, "- march fifth")).await.unwrap();
        archive.archive(session("c", 9, "- march ninth")).await.unwrap();

        let range = archive.sessions_by_date(day(5), Some(day(9)), 10, 10_000).await.unwrap();
        assert!(range.contains("march fifth") && range.contains("march ninth"));
        assert!(!range.contains("march first"));

        let single = archive.sessions_by_date(day(1), None, 10, 10_000).await.unwrap();
        assert!(single.contains("march first"));
        assert!(!single.contains("march fifth"));
    }

    #[tokio::test]
    async fn test_corrupt_archive_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sessions.json");
        tokio::fs::write(&path, "garbage").await.unwrap();
        let archive = FileSessionArchive::new(&path);
        assert_eq!(archive.recent_summaries(5, 100).await.unwrap(), "");
        archive.archive(session("a", 1, "- fresh")).await.unwrap();
        assert!(archive.recent_summaries(5, 1_000).await.unwrap().contains("- fresh"));
    }
}
