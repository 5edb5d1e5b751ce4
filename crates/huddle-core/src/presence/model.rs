//! Presence data types

use serde::{Deserialize, Serialize};

/// Identity of whoever is calling into the registry
///
/// Issued by the external auth layer. An anonymous caller can read presence
/// but cannot publish it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    user_id: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller; an empty id counts as anonymous
    pub fn user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: (!user_id.is_empty()).then_some(user_id),
        }
    }

    pub fn from_option(user_id: Option<String>) -> Self {
        user_id.map(Self::user).unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// One heartbeat's worth of presence data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub document_id: String,
    /// Opaque positional payload; the registry never interprets it
    pub cursor: String,
    pub display_name: Option<String>,
    pub display_color: Option<String>,
}

impl Heartbeat {
    pub fn new(document_id: impl Into<String>, cursor: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            cursor: cursor.into(),
            display_name: None,
            display_color: None,
        }
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    pub fn with_display_color(mut self, color: Option<String>) -> Self {
        self.display_color = color;
        self
    }
}

/// A stored liveness row, one per (document, user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub document_id: String,
    pub user_id: String,
    pub cursor: String,
    pub display_name: Option<String>,
    pub display_color: Option<String>,
    /// Wall-clock ms of the latest heartbeat
    pub updated_at: i64,
}

impl PresenceRecord {
    pub fn from_heartbeat(user_id: &str, heartbeat: Heartbeat, now_ms: i64) -> Self {
        Self {
            document_id: heartbeat.document_id,
            user_id: user_id.to_string(),
            cursor: heartbeat.cursor,
            display_name: heartbeat.display_name,
            display_color: heartbeat.display_color,
            updated_at: now_ms,
        }
    }
}

/// What readers of a document's presence get back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub user_id: String,
    pub display_name: Option<String>,
    pub display_color: Option<String>,
    pub cursor: String,
}

impl From<PresenceRecord> for PresenceView {
    fn from(record: PresenceRecord) -> Self {
        Self {
            user_id: record.user_id,
            display_name: record.display_name,
            display_color: record.display_color,
            cursor: record.cursor,
        }
    }
}
