//! Block rendering for exported pages.
//!
//! Layout of a page:
//!
//! ```text
//! [paragraph]  Source · link · entry count · extraction mode · last activity
//! [heading_3]  query 1
//! [paragraph]  answer 1, one block per blank-line separated paragraph
//! [divider]
//! [heading_3]  query 2
//! ...
//! ```

use crate::export::{PageParent, PageRequest};
use crate::model::{ExtractionMode, ThreadDetail};
use serde_json::{Value, json};

/// Longest `text.content` the write API accepts in one rich-text segment.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Most rich-text segments per block.
const MAX_SEGMENTS_PER_BLOCK: usize = 100;

/// Build the page-creation request for `detail` with every child block.
///
/// The children list is unbounded; [`split_children`](super::split_children)
/// cuts it down to the per-call limit.
#[must_use]
pub fn render_page(parent: &PageParent, detail: &ThreadDetail) -> PageRequest {
    let title = detail.thread.title.trim();
    let title = if title.is_empty() { "Untitled" } else { title };

    let mut properties = serde_json::Map::new();
    properties.insert(
        parent.title_property().to_string(),
        json!({ "title": rich_text(title) }),
    );

    let mut children = vec![metadata_block(detail)];
    for (index, entry) in detail.entries.iter().enumerate() {
        if index > 0 {
            children.push(json!({ "object": "block", "type": "divider", "divider": {} }));
        }
        if !entry.query.is_empty() {
            children.push(text_block("heading_3", &entry.query));
        }
        children.extend(
            entry
                .answer
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .flat_map(paragraph_blocks),
        );
    }

    PageRequest {
        parent: parent.clone(),
        properties: Value::Object(properties),
        children,
    }
}

fn metadata_block(detail: &ThreadDetail) -> Value {
    let thread = &detail.thread;
    let url = thread.source.thread_url(&thread.id);
    let mut parts = vec![
        format!("Source: {}", thread.source.display_name()),
        format!("Entries: {}", detail.entries.len()),
    ];
    if detail.extraction == ExtractionMode::Dom {
        parts.push("Extracted from page content".to_string());
    }
    if let Some(at) = thread.last_activity {
        parts.push(format!("Last activity: {}", at.format("%Y-%m-%d %H:%M UTC")));
    }

    let mut segments = vec![json!({
        "type": "text",
        "text": { "content": format!("{} · ", parts.join(" · ")) },
        "annotations": { "color": "gray" }
    })];
    segments.push(json!({
        "type": "text",
        "text": { "content": "Open original", "link": { "url": url } },
        "annotations": { "color": "gray" }
    }));
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": segments }
    })
}

fn text_block(kind: &str, text: &str) -> Value {
    let segments: Vec<Value> = rich_text(text).into_iter().take(MAX_SEGMENTS_PER_BLOCK).collect();
    let mut block = serde_json::Map::new();
    block.insert("object".to_string(), json!("block"));
    block.insert("type".to_string(), json!(kind));
    block.insert(kind.to_string(), json!({ "rich_text": segments }));
    Value::Object(block)
}

/// Paragraph blocks for one paragraph of text, each under the segment limit.
fn paragraph_blocks(text: &str) -> Vec<Value> {
    rich_text(text)
        .chunks(MAX_SEGMENTS_PER_BLOCK)
        .map(|segments| {
            json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": segments }
            })
        })
        .collect()
}

/// Plain rich-text segments of at most [`MAX_RICH_TEXT_CHARS`] characters.
#[must_use]
pub fn rich_text(text: &str) -> Vec<Value> {
    split_text(text, MAX_RICH_TEXT_CHARS)
        .into_iter()
        .map(|chunk| json!({ "type": "text", "text": { "content": chunk } }))
        .collect()
}

/// Split on character boundaries into chunks of at most `max_chars`.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
