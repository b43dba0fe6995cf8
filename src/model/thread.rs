//! Thread, entry and detail models.

use crate::model::SourcePlatform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation summary as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Opaque per-source identifier; immutable once observed.
    pub id: String,

    pub title: String,

    pub source: SourcePlatform,

    /// Last activity reported by the source, if any.
    pub last_activity: Option<DateTime<Utc>>,
}

impl Thread {
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: SourcePlatform) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source,
            last_activity: None,
        }
    }

    #[must_use]
    pub fn with_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }
}

/// One query/answer pair inside a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub query: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            created_at: None,
        }
    }

    /// An entry with both sides blank carries nothing to export.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !(self.query.trim().is_empty() && self.answer.trim().is_empty())
    }
}

/// How a detail's entries were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Parsed from a network API response.
    #[default]
    Api,
    /// Recovered from the rendered document after every endpoint failed.
    Dom,
}

/// Full entries for one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDetail {
    pub thread: Thread,
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub extraction: ExtractionMode,
    /// Reason the fetch failed; set together with empty `entries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ThreadDetail {
    #[must_use]
    pub fn new(thread: Thread, entries: Vec<Entry>) -> Self {
        Self {
            thread,
            entries,
            extraction: ExtractionMode::Api,
            error: None,
        }
    }

    /// Detail for a thread whose entries could not be fetched.
    pub fn failed(thread: Thread, reason: impl Into<String>) -> Self {
        Self {
            thread,
            entries: Vec::new(),
            extraction: ExtractionMode::Api,
            error: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.extraction == ExtractionMode::Dom
    }
}

/// A named grouping of threads (project, space, collection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<usize>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListPage {
    pub items: Vec<Thread>,
    pub has_more: bool,
}
