//! Export of thread details as pages in a Notion-like document API.
//!
//! # Submodules
//!
//! - [`blocks`] - Render a [`ThreadDetail`](crate::model::ThreadDetail) into page blocks
//! - [`notion`] - [`PageWriter`] over the Notion REST API
//! - [`exporter`] - Split oversized pages and send every call through the dispatch queue

pub mod blocks;
pub mod exporter;
pub mod notion;

pub use blocks::{MAX_RICH_TEXT_CHARS, render_page};
pub use exporter::{ExportReceipt, Exporter, MAX_CHILDREN_PER_CALL, split_children};
pub use notion::NotionClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where new pages are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PageParent {
    Page(String),
    Database(String),
}

impl PageParent {
    /// The `parent` object of a page-creation request.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Page(id) => serde_json::json!({ "page_id": id }),
            Self::Database(id) => serde_json::json!({ "database_id": id }),
        }
    }

    /// Name of the title property pages under this parent carry.
    #[must_use]
    pub const fn title_property(&self) -> &'static str {
        match self {
            Self::Page(_) => "title",
            Self::Database(_) => "Name",
        }
    }
}

/// A page-creation request: `{parent, properties, children[]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub parent: PageParent,
    pub properties: Value,
    pub children: Vec<Value>,
}

impl PageRequest {
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "parent": self.parent.to_json(),
            "properties": self.properties,
            "children": self.children,
        })
    }
}

/// A page created by the write API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Outbound write API.
#[async_trait]
pub trait PageWriter: Send + Sync {
    /// Create a page. `request.children` must respect the API's per-call limit.
    async fn create_page(&self, request: &PageRequest) -> Result<PageRef>;

    /// Append blocks to the end of an existing page.
    async fn append_children(&self, page_id: &str, children: &[Value]) -> Result<()>;

    /// Move a page to the trash.
    async fn archive_page(&self, page_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parent_json() {
        assert_eq!(
            PageParent::Page("p".into()).to_json(),
            json!({"page_id": "p"})
        );
        assert_eq!(
            PageParent::Database("d".into()).to_json(),
            json!({"database_id": "d"})
        );
        assert_eq!(PageParent::Database("d".into()).title_property(), "Name");
    }
}
