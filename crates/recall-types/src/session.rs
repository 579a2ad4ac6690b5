//! Archived session summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished session condensed for later recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message_count: usize,
    pub summary: String,
}

impl SessionSummary {
    /// One-block rendering used in the session-archive context section.
    pub fn render(&self) -> String {
        format!(
            "[{} ~ {}] ({} messages)\n{}",
            self.started_at.format("%Y-%m-%d %H:%M"),
            self.ended_at.format("%H:%M"),
            self.message_count,
            self.summary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_contains_counts_and_times() {
        let s = SessionSummary {
            session_id: "s1".into(),
            started_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
            ended_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 5, 0).unwrap(),
            message_count: 12,
            summary: "- talked about tea".into(),
        };
        let text = s.render();
        assert!(text.starts_with("[2024-01-15 09:30 ~ 10:05] (12 messages)"));
        assert!(text.ends_with("- talked about tea"));
    }
}
