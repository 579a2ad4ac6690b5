//! Session archive trait and its type-erased wrapper.
//!
//! The archive keeps condensed summaries of finished sessions so that later
//! turns can recall "what we talked about last Tuesday" without the full log.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, NaiveDate, Utc};

use recall_types::error::RepositoryError;
use recall_types::session::SessionSummary;

/// Trait for storing and rendering past session summaries.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in recall-infra.
pub trait SessionArchive: Send + Sync {
    /// Append a finished session.
    fn archive(
        &self,
        summary: SessionSummary,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Render the `limit` most recent sessions, newest first, within `max_chars`.
    fn recent_summaries(
        &self,
        limit: usize,
        max_chars: usize,
    ) -> impl Future<Output = Result<String, RepositoryError>> + Send;

    /// Render sessions that started between `from` and `to` (inclusive).
    /// `to = None` means the single day `from`.
    fn sessions_by_date(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> impl Future<Output = Result<String, RepositoryError>> + Send;

    /// When the most recent archived session ended.
    fn last_session_end(
        &self,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, RepositoryError>> + Send;
}

/// Object-safe version of [`SessionArchive`] with boxed futures.
pub trait SessionArchiveDyn: Send + Sync {
    fn archive_boxed<'a>(
        &'a self,
        summary: SessionSummary,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;

    fn recent_summaries_boxed<'a>(
        &'a self,
        limit: usize,
        max_chars: usize,
    ) -> Pin<Box<dyn Future<Output = Result<String, RepositoryError>> + Send + 'a>>;

    fn sessions_by_date_boxed<'a>(
        &'a self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> Pin<Box<dyn Future<Output = Result<String, RepositoryError>> + Send + 'a>>;

    fn last_session_end_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DateTime<Utc>>, RepositoryError>> + Send + 'a>>;
}

impl<T: SessionArchive> SessionArchiveDyn for T {
    fn archive_boxed<'a>(
        &'a self,
        summary: SessionSummary,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.archive(summary))
    }

    fn recent_summaries_boxed<'a>(
        &'a self,
        limit: usize,
        max_chars: usize,
    ) -> Pin<Box<dyn Future<Output = Result<String, RepositoryError>> + Send + 'a>> {
        Box::pin(self.recent_summaries(limit, max_chars))
    }

    fn sessions_by_date_boxed<'a>(
        &'a self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> Pin<Box<dyn Future<Output = Result<String, RepositoryError>> + Send + 'a>> {
        Box::pin(self.sessions_by_date(from, to, limit, max_chars))
    }

    fn last_session_end_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<DateTime<Utc>>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.last_session_end())
    }
}

/// Type-erased session archive.
pub struct BoxSessionArchive {
    inner: Box<dyn SessionArchiveDyn + Send + Sync>,
}

impl BoxSessionArchive {
    pub fn new<T: SessionArchive + 'static>(archive: T) -> Self {
        Self {
            inner: Box::new(archive),
        }
    }

    pub async fn archive(&self, summary: SessionSummary) -> Result<(), RepositoryError> {
        self.inner.archive_boxed(summary).await
    }

    pub async fn recent_summaries(
        &self,
        limit: usize,
        max_chars: usize,
    ) -> Result<String, RepositoryError> {
        self.inner.recent_summaries_boxed(limit, max_chars).await
    }

    pub async fn sessions_by_date(
        &self,
        from: NaiveDate,
        to: Option<NaiveDate>,
        limit: usize,
        max_chars: usize,
    ) -> Result<String, RepositoryError> {
        self.inner
            .sessions_by_date_boxed(from, to, limit, max_chars)
            .await
    }

    pub async fn last_session_end(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.inner.last_session_end_boxed().await
    }

    /// Time elapsed between the end of the last archived session and `now`.
    pub async fn time_since_last_session(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<chrono::Duration>, RepositoryError> {
        Ok(self
            .last_session_end()
            .await?
            .map(|ended| (now - ended).max(chrono::Duration::zero())))
    }
}
