//! Working buffer: the bounded, in-order window of recent conversation turns.
//!
//! Holds at most `max_turns * 2` messages (oldest dropped first) and renders
//! them for the `working_memory` context section. Older messages can be
//! rendered in a compressed form so the recent turns always stay verbatim.
//!
//! The buffer is persisted as a [`WorkingSnapshot`] through a
//! [`BoxDocumentStore`]; a missing or corrupt snapshot degrades to an empty
//! buffer rather than failing startup.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use recall_types::config::WorkingConfig;
use recall_types::error::RepositoryError;
use recall_types::working::{Role, SNAPSHOT_VERSION, TimestampedMessage, WorkingSnapshot};

use crate::storage::box_document::BoxDocumentStore;

/// Message shown when the buffer holds nothing yet.
pub const FIRST_CONVERSATION: &str = "First conversation - greet naturally.";

/// Bounded recent-turn buffer for one conversation.
#[derive(Debug, Clone)]
pub struct WorkingBuffer {
    config: WorkingConfig,
    session_id: String,
    session_start: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: VecDeque<TimestampedMessage>,
}

impl WorkingBuffer {
    /// Create an empty buffer with a fresh session id.
    pub fn new(config: WorkingConfig, now: DateTime<Utc>) -> Self {
        let capacity = config.max_turns.saturating_mul(2);
        Self {
            config,
            session_id: Uuid::now_v7().to_string(),
            session_start: now,
            last_activity: now,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    /// Maximum number of messages retained.
    pub fn capacity(&self) -> usize {
        self.config.max_turns.saturating_mul(2)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of complete user/assistant exchanges.
    pub fn turn_count(&self) -> usize {
        self.messages.len() / 2
    }

    /// Snapshot of the buffered messages, oldest first.
    pub fn messages(&self) -> Vec<TimestampedMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Append a message, evicting the oldest when the buffer is full.
    pub fn push(&mut self, role: Role, content: &str, now: DateTime<Utc>) {
        self.push_message(TimestampedMessage {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        self.last_activity = now;
        tracing::debug!(
            session_id = %self.session_id,
            buffered = self.messages.len(),
            "working buffer append"
        );
    }

    fn push_message(&mut self, message: TimestampedMessage) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        while self.messages.len() >= capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Render the last `max_turns` turns (defaults to the configured maximum)
    /// with relative and clock time on every line.
    pub fn context(&self, max_turns: Option<usize>, now: DateTime<Utc>) -> String {
        let turns = max_turns.unwrap_or(self.config.max_turns);
        let take = turns.saturating_mul(2).min(self.messages.len());
        let skip = self.messages.len() - take;
        self.messages
            .iter()
            .skip(skip)
            .map(|m| format_for_context(m, now))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the last `full_turns` turns verbatim and everything older in a
    /// compressed, length-capped form.
    pub fn progressive_context(&self, full_turns: usize, now: DateTime<Utc>) -> String {
        let full_count = full_turns.saturating_mul(2);
        if self.messages.len() <= full_count {
            return self.context(Some(full_turns), now);
        }

        let split = self.messages.len() - full_count;
        let mut lines = Vec::with_capacity(self.messages.len());
        for m in self.messages.iter().take(split) {
            let limit = match m.role {
                Role::User => self.config.user_compress_chars,
                _ => self.config.assistant_compress_chars,
            };
            lines.push(format!(
                "[{}] {}: {}",
                relative_time(m.timestamp, now),
                m.role,
                compress(&m.content, limit)
            ));
        }
        lines.extend(
            self.messages
                .iter()
                .skip(split)
                .map(|m| format_for_context(m, now)),
        );

        tracing::debug!(
            compressed = split,
            full = full_count,
            "progressive working context"
        );
        lines.join("\n")
    }

    /// Describe how long the conversation has been idle since the last
    /// buffered message. Empty when the gap is under 30 seconds.
    pub fn time_elapsed_context(&self, now: DateTime<Utc>) -> String {
        let Some(last) = self.messages.back() else {
            return FIRST_CONVERSATION.to_string();
        };
        describe_gap(now - last.timestamp)
    }

    /// Remove and return every buffered message.
    pub fn flush(&mut self) -> Vec<TimestampedMessage> {
        self.messages.drain(..).collect()
    }

    /// Start a new session: clear the buffer and return the previous session id.
    pub fn reset_session(&mut self, now: DateTime<Utc>) -> String {
        let old = std::mem::replace(&mut self.session_id, Uuid::now_v7().to_string());
        self.session_start = now;
        self.last_activity = now;
        self.messages.clear();
        tracing::info!(old_session = %old, new_session = %self.session_id, "working session reset");
        old
    }

    /// Capture the buffer for persistence.
    pub fn snapshot(&self, now: DateTime<Utc>) -> WorkingSnapshot {
        WorkingSnapshot {
            session_id: self.session_id.clone(),
            session_start: self.session_start,
            last_activity: self.last_activity,
            messages: self.messages(),
            saved_at: now,
            version: SNAPSHOT_VERSION.to_string(),
        }
    }

    /// Rebuild a buffer from a snapshot, keeping only the newest messages
    /// that fit the configured capacity.
    pub fn from_snapshot(config: WorkingConfig, snapshot: WorkingSnapshot) -> Self {
        let mut buffer = Self {
            config,
            session_id: snapshot.session_id,
            session_start: snapshot.session_start,
            last_activity: snapshot.last_activity,
            messages: VecDeque::new(),
        };
        for message in snapshot.messages {
            buffer.push_message(message);
        }
        buffer
    }

    /// Persist the buffer as a whole document.
    #[tracing::instrument(name = "working_save", skip(self, store), fields(messages = self.messages.len()))]
    pub async fn save(
        &self,
        store: &BoxDocumentStore<WorkingSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        store.save(&self.snapshot(now)).await
    }

    /// Load a buffer from `store`. Missing or unreadable snapshots yield an
    /// empty buffer.
    #[tracing::instrument(name = "working_load", skip(config, store))]
    pub async fn load(
        config: WorkingConfig,
        store: &BoxDocumentStore<WorkingSnapshot>,
        now: DateTime<Utc>,
    ) -> Self {
        match store.load().await {
            Ok(Some(snapshot)) => {
                let buffer = Self::from_snapshot(config, snapshot);
                tracing::info!(messages = buffer.len(), "working buffer restored");
                buffer
            }
            Ok(None) => {
                tracing::debug!("no working snapshot, starting empty");
                Self::new(config, now)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load working snapshot, starting empty");
                Self::new(config, now)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

/// Human-readable age of `ts` relative to `now`.
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - ts;
    let secs = elapsed.num_seconds().max(0);
    if secs < 30 {
        "just now".to_string()
    } else if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else if elapsed.num_days() < 7 {
        format!("{}d ago", elapsed.num_days())
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

/// Full rendering: `[{relative} | HH:MM] role: content`.
pub fn format_for_context(message: &TimestampedMessage, now: DateTime<Utc>) -> String {
    format!(
        "[{} | {}] {}: {}",
        relative_time(message.timestamp, now),
        message.timestamp.format("%H:%M"),
        message.role,
        message.content
    )
}

fn compress(content: &str, limit: usize) -> String {
    if content.chars().count() > limit {
        let mut cut: String = content.chars().take(limit).collect();
        cut.push_str("...");
        cut
    } else {
        content.to_string()
    }
}

fn describe_gap(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs < 30 {
        String::new()
    } else if secs < 5 * 60 {
        format!("Paused for {} min - pick up right where we left off.", secs / 60)
    } else if secs < 3600 {
        format!(
            "Resumed after {} min - same context, no greeting needed.",
            secs / 60
        )
    } else if secs < 6 * 3600 {
        format!(
            "Resumed after {} h - brief check-in, then back to the previous topic.",
            secs / 3600
        )
    } else if secs < 86_400 {
        format!(
            "Resumed after {} h - feels like a new session, ask how the day is going.",
            secs / 3600
        )
    } else {
        format!(
            "Resumed after {} days - it has been a while, start with a greeting.",
            elapsed.num_days()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    use crate::storage::document::DocumentStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn config(max_turns: usize) -> WorkingConfig {
        WorkingConfig {
            max_turns,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct MemoryDocs {
        doc: Mutex<Option<WorkingSnapshot>>,
        corrupt: bool,
    }

    impl DocumentStore<WorkingSnapshot> for MemoryDocs {
        async fn load(&self) -> Result<Option<WorkingSnapshot>, RepositoryError> {
            if self.corrupt {
                return Err(RepositoryError::Corrupt("bad json".into()));
            }
            Ok(self.doc.lock().unwrap().clone())
        }

        async fn save(&self, document: &WorkingSnapshot) -> Result<(), RepositoryError> {
            *self.doc.lock().unwrap() = Some(document.clone());
            Ok(())
        }
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buf = WorkingBuffer::new(config(2), t0());
        for i in 0..6 {
            buf.push(Role::User, &format!("m{i}"), t0());
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.messages()[0].content, "m2");
        assert_eq!(buf.turn_count(), 2);
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = t0();
        assert_eq!(relative_time(now - Duration::seconds(5), now), "just now");
        assert_eq!(relative_time(now - Duration::seconds(45), now), "45s ago");
        assert_eq!(relative_time(now - Duration::minutes(12), now), "12m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "2024-01-31");
    }

    #[test]
    fn test_format_for_context() {
        let msg = TimestampedMessage {
            role: Role::Assistant,
            content: "hello".into(),
            timestamp: t0(),
        };
        assert_eq!(
            format_for_context(&msg, t0() + Duration::minutes(2)),
            "[2m ago | 12:00] assistant: hello"
        );
    }

    #[test]
    fn test_context_limits_turns() {
        let mut buf = WorkingBuffer::new(config(20), t0());
        for i in 0..10 {
            buf.push(Role::User, &format!("q{i}"), t0());
            buf.push(Role::Assistant, &format!("a{i}"), t0());
        }
        let ctx = buf.context(Some(2), t0());
        assert_eq!(ctx.lines().count(), 4);
        assert!(ctx.contains("q8"));
        assert!(!ctx.contains("q7"));
    }

    #[test]
    fn test_progressive_context_compresses_older() {
        let mut buf = WorkingBuffer::new(config(20), t0());
        let long_user = "u".repeat(600);
        let long_assistant = "a".repeat(400);
        buf.push(Role::User, &long_user, t0());
        buf.push(Role::Assistant, &long_assistant, t0());
        buf.push(Role::User, "recent question", t0());
        buf.push(Role::Assistant, "recent answer", t0());

        let ctx = buf.progressive_context(1, t0());
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("[just now] user: {}...", "u".repeat(500)));
        assert_eq!(
            lines[1],
            format!("[just now] assistant: {}...", "a".repeat(300))
        );
        assert_eq!(lines[2], "[just now | 12:00] user: recent question");
    }

    #[test]
    fn test_progressive_context_short_buffer_is_full() {
        let mut buf = WorkingBuffer::new(config(20), t0());
        buf.push(Role::User, "hi", t0());
        assert_eq!(buf.progressive_context(6, t0()), "[just now | 12:00] user: hi");
    }

    #[test]
    fn test_time_elapsed_context() {
        let mut buf = WorkingBuffer::new(config(20), t0());
        assert_eq!(buf.time_elapsed_context(t0()), FIRST_CONVERSATION);

        buf.push(Role::User, "hi", t0());
        assert_eq!(buf.time_elapsed_context(t0() + Duration::seconds(10)), "");
        assert!(
            buf.time_elapsed_context(t0() + Duration::minutes(3))
                .starts_with("Paused for 3 min")
        );
        assert!(
            buf.time_elapsed_context(t0() + Duration::minutes(20))
                .starts_with("Resumed after 20 min")
        );
        assert!(
            buf.time_elapsed_context(t0() + Duration::hours(2))
                .starts_with("Resumed after 2 h - brief")
        );
        assert!(
            buf.time_elapsed_context(t0() + Duration::hours(10))
                .starts_with("Resumed after 10 h - feels")
        );
        assert!(
            buf.time_elapsed_context(t0() + Duration::days(3))
                .starts_with("Resumed after 3 days")
        );
    }

    #[test]
    fn test_flush_and_reset() {
        let mut buf = WorkingBuffer::new(config(20), t0());
        buf.push(Role::User, "a", t0());
        buf.push(Role::Assistant, "b", t0());
        let old_id = buf.session_id().to_string();

        let flushed = buf.flush();
        assert_eq!(flushed.len(), 2);
        assert!(buf.is_empty());

        buf.push(Role::User, "c", t0());
        let returned = buf.reset_session(t0() + Duration::hours(1));
        assert_eq!(returned, old_id);
        assert_ne!(buf.session_id(), old_id);
        assert!(buf.is_empty());
        assert_eq!(buf.session_start(), t0() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = BoxDocumentStore::new(MemoryDocs::default());
        let mut buf = WorkingBuffer::new(config(20), t0());
        buf.push(Role::User, "remember this", t0());
        buf.save(&store, t0()).await.unwrap();

        let loaded = WorkingBuffer::load(config(20), &store, t0()).await;
        assert_eq!(loaded.session_id(), buf.session_id());
        assert_eq!(loaded.messages(), buf.messages());
    }

    #[tokio::test]
    async fn test_load_trims_to_capacity() {
        let store = BoxDocumentStore::new(MemoryDocs::default());
        let mut big = WorkingBuffer::new(config(20), t0());
        for i in 0..10 {
            big.push(Role::User, &format!("m{i}"), t0());
        }
        big.save(&store, t0()).await.unwrap();

        let small = WorkingBuffer::load(config(2), &store, t0()).await;
        assert_eq!(small.len(), 4);
        assert_eq!(small.messages()[0].content, "m6");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_yields_empty_buffer() {
        let store = BoxDocumentStore::new(MemoryDocs {
            corrupt: true,
            ..Default::default()
        });
        let buf = WorkingBuffer::load(config(20), &store, t0()).await;
        assert!(buf.is_empty());
    }
}
