//! Role-based message pairing.
//!
//! Shared by network payload parsing (message lists with author roles) and
//! the document fallback extractors.

use crate::model::Entry;
use crate::normalize::parse_timestamp;
use crate::normalize::strategies::TIME_KEYS;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// System notes, tool output, and anything unattributed.
    Other,
}

impl Role {
    /// Classify a role label as used by the various sources.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" | "human" | "you" | "query" | "question" | "prompt" => Self::User,
            "assistant" | "bot" | "ai" | "model" | "answer" | "response" | "chatgpt"
            | "claude" | "perplexity" => Self::Assistant,
            _ => Self::Other,
        }
    }
}

/// A single message in conversational order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMessage {
    pub role: Role,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl RoleMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: None,
        }
    }

    /// Read a message from a raw JSON record.
    ///
    /// The role comes from `role`, `sender`, `author.role` or `type`; the
    /// text from `content` (string, parts array, or `{parts}`) or `text`.
    #[must_use]
    pub fn from_json(record: &Value) -> Option<Self> {
        let label = record
            .get("role")
            .or_else(|| record.get("sender"))
            .or_else(|| record.get("author").and_then(|a| a.get("role")))
            .or_else(|| record.get("type"))
            .and_then(Value::as_str)?;

        let text = record
            .get("content")
            .and_then(content_text)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| record.get("text").and_then(content_text))
            .unwrap_or_default();

        let created_at = TIME_KEYS
            .iter()
            .find_map(|key| record.get(*key).and_then(parse_timestamp));

        Some(Self {
            role: Role::from_label(label),
            text,
            created_at,
        })
    }
}

/// Flatten the content shapes sources use into plain text.
pub(crate) fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let texts: Vec<String> = parts.iter().filter_map(content_text).collect();
            Some(texts.join("\n"))
        }
        Value::Object(map) => map
            .get("parts")
            .and_then(content_text)
            .or_else(|| map.get("text").and_then(content_text)),
        _ => None,
    }
}

/// What to do with a query still pending when the messages run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingRule {
    /// Unanswered trailing queries are not exported.
    #[default]
    Drop,
    /// Pair the pending query with the last unattributed content seen after it.
    PairWithLastContent,
}

/// Pair user messages with the assistant reply that follows them.
///
/// A user message replaces any pending query. An assistant message is
/// paired only when a non-empty query is pending. Order is preserved and the
/// result depends only on the input.
#[must_use]
pub fn pair_messages(messages: &[RoleMessage], trailing: TrailingRule) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut pending: Option<&RoleMessage> = None;
    let mut last_content: Option<&str> = None;

    for message in messages {
        match message.role {
            Role::User => {
                pending = Some(message);
                last_content = None;
            }
            Role::Assistant => {
                if let Some(query) = pending.filter(|q| !q.text.trim().is_empty()) {
                    entries.push(Entry {
                        query: query.text.clone(),
                        answer: message.text.clone(),
                        created_at: query.created_at.or(message.created_at),
                    });
                    pending = None;
                    last_content = None;
                }
            }
            Role::Other => {
                if !message.text.trim().is_empty() {
                    last_content = Some(message.text.as_str());
                }
            }
        }
    }

    if trailing == TrailingRule::PairWithLastContent {
        if let (Some(query), Some(content)) = (pending, last_content) {
            if !query.text.trim().is_empty() {
                entries.push(Entry {
                    query: query.text.clone(),
                    answer: content.to_string(),
                    created_at: query.created_at,
                });
            }
        }
    }

    entries
}
