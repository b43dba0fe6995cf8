//! Ordered field-extraction tables.
//!
//! Each field (query, answer, timestamp) has a list of named strategies,
//! tried in order; the first non-empty value wins. New source quirks are a
//! new row in a table, not a new branch.

use serde_json::Value;

/// One way of pulling a text field out of a raw record.
#[derive(Clone, Copy)]
pub enum FieldStrategy {
    /// A top-level string key.
    Key(&'static str),
    /// A nested string reached through object keys.
    Path(&'static [&'static str]),
    /// An array of fragments concatenated in order (strings or `{text}` objects).
    Chunks(&'static str),
    /// Anything else.
    Custom(&'static str, fn(&Value) -> Option<String>),
}

impl FieldStrategy {
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Key(key) | Self::Chunks(key) => (*key).to_string(),
            Self::Path(path) => path.join("."),
            Self::Custom(name, _) => (*name).to_string(),
        }
    }

    #[must_use]
    pub fn extract(&self, record: &Value) -> Option<String> {
        let value = match self {
            Self::Key(key) => record.get(*key).and_then(Value::as_str).map(str::to_string),
            Self::Path(path) => path
                .iter()
                .try_fold(record, |v, key| v.get(*key))
                .and_then(Value::as_str)
                .map(str::to_string),
            Self::Chunks(key) => record.get(*key).and_then(concat_chunks),
            Self::Custom(_, f) => f(record),
        };
        value.filter(|s| !s.trim().is_empty())
    }
}

/// First non-empty value produced by `strategies`.
#[must_use]
pub fn first_match(strategies: &[FieldStrategy], record: &Value) -> Option<String> {
    strategies.iter().find_map(|s| s.extract(record))
}

pub static QUERY_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy::Key("query"),
    FieldStrategy::Key("query_str"),
    FieldStrategy::Key("question"),
    FieldStrategy::Key("prompt"),
    FieldStrategy::Key("user_message"),
    FieldStrategy::Path(&["user", "text"]),
    FieldStrategy::Key("input"),
];

pub static ANSWER_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy::Key("answer"),
    FieldStrategy::Custom("blocks.markdown_block", markdown_block_answer),
    FieldStrategy::Chunks("answer_chunks"),
    FieldStrategy::Chunks("chunks"),
    FieldStrategy::Key("response"),
    FieldStrategy::Key("assistant_message"),
    FieldStrategy::Path(&["assistant", "text"]),
    FieldStrategy::Key("output"),
    FieldStrategy::Custom("text.answer", embedded_json_answer),
    FieldStrategy::Key("text"),
];

pub static TIME_KEYS: &[&str] = &[
    "created_at",
    "create_time",
    "entry_created_datetime",
    "timestamp",
    "updated_at",
    "update_time",
    "updated_datetime",
    "last_query_datetime",
];

/// Keys under which a thread payload keeps its list of records.
pub static CONTAINER_KEYS: &[&str] = &[
    "entries",
    "turns",
    "qa_pairs",
    "items",
    "messages",
    "chat_messages",
];

/// Concatenate an array of answer fragments.
fn concat_chunks(value: &Value) -> Option<String> {
    let parts = value.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| match p {
            Value::String(s) => Some(s.as_str()),
            other => other
                .get("text")
                .or_else(|| other.get("content"))
                .and_then(Value::as_str),
        })
        .collect();
    Some(text)
}

/// Answers split into typed blocks: `blocks[*].markdown_block.{answer|chunks}`.
fn markdown_block_answer(record: &Value) -> Option<String> {
    let blocks = record.get("blocks")?.as_array()?;
    let sections: Vec<String> = blocks
        .iter()
        .filter_map(|b| b.get("markdown_block"))
        .filter_map(|md| {
            md.get("answer")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| md.get("chunks").and_then(concat_chunks))
        })
        .filter(|s| !s.trim().is_empty())
        .collect();
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// A `text` field holding a JSON document with its own `answer` key.
fn embedded_json_answer(record: &Value) -> Option<String> {
    let text = record.get("text")?.as_str()?;
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let inner: Value = serde_json::from_str(trimmed).ok()?;
    match inner {
        Value::Object(_) => first_match(&ANSWER_STRATEGIES[..ANSWER_STRATEGIES.len() - 2], &inner),
        // Step lists: the final step carries the answer.
        Value::Array(steps) => steps.iter().rev().find_map(|step| {
            step.get("content")
                .and_then(|c| c.get("answer"))
                .and_then(Value::as_str)
                .and_then(|a| serde_json::from_str::<Value>(a).ok())
                .and_then(|v| v.get("answer").and_then(Value::as_str).map(str::to_string))
        }),
        _ => None,
    }
}
