//! Normalizer: heterogeneous source payloads into canonical entries.
//!
//! Priority when reading a payload:
//! 1. Records already in canonical `{query, answer}` form
//! 2. Role-attributed message lists, paired with [`pair_messages`]
//! 3. Flat records read through the alias tables in [`strategies`]
//!
//! Entries with neither a query nor an answer are dropped.

pub mod fingerprint;
pub mod pairing;
pub mod strategies;

pub use fingerprint::{Fingerprint, fingerprint, is_unchanged};
pub use pairing::{Role, RoleMessage, TrailingRule, pair_messages};

use crate::model::{Entry, ThreadDetail};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use strategies::{ANSWER_STRATEGIES, CONTAINER_KEYS, QUERY_STRATEGIES, TIME_KEYS, first_match};

/// Convert a raw thread payload (or bare record list) into entries.
#[must_use]
pub fn normalize_entries(raw: &Value) -> Vec<Entry> {
    let records = record_list(raw);
    if records.is_empty() {
        return Vec::new();
    }

    let entries = if looks_like_role_messages(&records) {
        let messages: Vec<RoleMessage> =
            records.iter().filter_map(|r| RoleMessage::from_json(r)).collect();
        pair_messages(&messages, TrailingRule::Drop)
    } else {
        records.iter().filter_map(|r| record_entry(r)).collect()
    };

    clean_entries(entries)
}

/// Trim entries and drop the invalid ones, keeping order.
#[must_use]
pub fn clean_entries(entries: Vec<Entry>) -> Vec<Entry> {
    entries
        .into_iter()
        .map(|e| Entry {
            query: e.query.trim().to_string(),
            answer: e.answer.trim().to_string(),
            created_at: e.created_at,
        })
        .filter(Entry::is_valid)
        .collect()
}

/// Apply [`clean_entries`] to a detail.
#[must_use]
pub fn normalize_detail(mut detail: ThreadDetail) -> ThreadDetail {
    detail.entries = clean_entries(std::mem::take(&mut detail.entries));
    detail.thread.title = detail.thread.title.trim().to_string();
    if detail.thread.title.is_empty() {
        detail.thread.title = detail
            .entries
            .first()
            .map(|e| truncate_title(&e.query))
            .unwrap_or_else(|| "Untitled".to_string());
    }
    detail
}

fn truncate_title(query: &str) -> String {
    let line = query.lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        let mut title: String = line.chars().take(77).collect();
        title.push_str("...");
        title
    } else {
        line.to_string()
    }
}

/// Parse the timestamp encodings sources use.
///
/// Accepts RFC 3339 strings, naive ISO strings (read as UTC), and epoch
/// numbers in seconds or milliseconds (values ≥ 1e11 are milliseconds).
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|n| n.and_utc())
                })
                .or_else(|| s.parse::<f64>().ok().and_then(from_epoch))
        }
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value >= 1e11 { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

/// Records of a payload: the payload itself when it is an array, the first
/// non-empty container list, or the payload as a single record.
fn record_list(raw: &Value) -> Vec<&Value> {
    if let Some(items) = raw.as_array() {
        return items.iter().collect();
    }
    for key in CONTAINER_KEYS {
        if let Some(items) = raw.get(*key).and_then(Value::as_array) {
            if !items.is_empty() {
                return items.iter().collect();
            }
        }
    }
    if raw.is_object() && first_match(QUERY_STRATEGIES, raw).is_some() {
        return vec![raw];
    }
    Vec::new()
}

fn looks_like_role_messages(records: &[&Value]) -> bool {
    records
        .iter()
        .any(|r| RoleMessage::from_json(r).is_some() && first_match(QUERY_STRATEGIES, r).is_none())
}

fn record_entry(record: &Value) -> Option<Entry> {
    let created_at = TIME_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(parse_timestamp));

    // Canonical shape first.
    if let (Some(query), Some(answer)) = (
        record.get("query").and_then(Value::as_str),
        record.get("answer").and_then(Value::as_str),
    ) {
        return Some(Entry {
            query: query.to_string(),
            answer: answer.to_string(),
            created_at,
        });
    }

    let query = first_match(QUERY_STRATEGIES, record);
    let answer = first_match(ANSWER_STRATEGIES, record);
    if query.is_none() && answer.is_none() {
        return None;
    }
    Some(Entry {
        query: query.unwrap_or_default(),
        answer: answer.unwrap_or_default(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourcePlatform, Thread};
    use serde_json::json;

    #[test]
    fn test_canonical_entries() {
        let raw = json!({"entries": [
            {"query": "q1", "answer": "a1"},
            {"query": "", "answer": ""},
            {"query": " q2 ", "answer": "a2\n"}
        ]});
        let entries = normalize_entries(&raw);
        assert_eq!(entries, vec![Entry::new("q1", "a1"), Entry::new("q2", "a2")]);
    }

    #[test]
    fn test_flat_aliases_and_chunks() {
        let raw = json!([
            {"query_str": "what is rust", "blocks": [
                {"markdown_block": {"chunks": ["A systems ", "language."]}}
            ], "updated_datetime": "2024-03-01T10:00:00"},
            {"question": "and cargo?", "response": "Its build tool."}
        ]);
        let entries = normalize_entries(&raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].query, "what is rust");
        assert_eq!(entries[0].answer, "A systems language.");
        assert_eq!(
            entries[0].created_at.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
        assert_eq!(entries[1], Entry::new("and cargo?", "Its build tool."));
    }

    #[test]
    fn test_role_message_lists_are_paired() {
        let raw = json!({"chat_messages": [
            {"sender": "human", "text": "q1"},
            {"sender": "assistant", "text": "a1"},
            {"sender": "human", "text": "q2"}
        ]});
        assert_eq!(normalize_entries(&raw), vec![Entry::new("q1", "a1")]);
    }

    #[test]
    fn test_unrecognized_payload_yields_nothing() {
        assert!(normalize_entries(&json!({"foo": 1})).is_empty());
        assert!(normalize_entries(&json!("text")).is_empty());
        assert!(normalize_entries(&json!({"entries": []})).is_empty());
    }

    #[test]
    fn test_parse_timestamp_encodings() {
        let secs = parse_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = parse_timestamp(&json!(1_700_000_000_000_i64)).unwrap();
        let rfc = parse_timestamp(&json!("2023-11-14T22:13:20Z")).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, rfc);
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_normalize_detail_fills_missing_title() {
        let thread = Thread::new("t", "  ", SourcePlatform::Claude);
        let detail = ThreadDetail::new(
            thread,
            vec![Entry::new("", ""), Entry::new("First question\nmore", "a")],
        );
        let detail = normalize_detail(detail);
        assert_eq!(detail.entries.len(), 1);
        assert_eq!(detail.thread.title, "First question");
    }
}
