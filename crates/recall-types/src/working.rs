//! Working-buffer message types and the on-disk snapshot format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Speaker of a buffered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Map free-form role labels onto the three canonical roles.
    ///
    /// Unknown labels are treated as the user.
    pub fn normalize(label: &str) -> Self {
        label.parse().unwrap_or(Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "human" => Ok(Role::User),
            "assistant" | "ai" | "bot" | "model" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// A single buffered conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted state of the working buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingSnapshot {
    pub session_id: String,
    pub session_start: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<TimestampedMessage>,
    pub saved_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    SNAPSHOT_VERSION.to_string()
}
