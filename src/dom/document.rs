//! The currently open document.
//!
//! Adapters fall back to structural extraction only for the item the user
//! has open. [`ActiveDocument`] exposes that item's locator and a snapshot
//! of its rendered tree.

use crate::dom::DomNode;
use crate::error::{Error, Result};
use std::path::Path;

/// The document currently rendered for the user.
pub trait ActiveDocument: Send + Sync {
    /// Locator (URL) of the open document, if any.
    fn locator(&self) -> Option<String>;

    /// Rendered tree of the open document.
    fn snapshot(&self) -> Result<DomNode>;
}

/// A saved HTML rendering paired with the URL it was captured from.
#[derive(Debug, Clone)]
pub struct HtmlSnapshot {
    locator: String,
    html: String,
}

impl HtmlSnapshot {
    pub fn new(locator: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            html: html.into(),
        }
    }

    /// Read a saved page from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(locator: impl Into<String>, path: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidArgument(format!("cannot read snapshot {}: {e}", path.display()))
        })?;
        Ok(Self::new(locator, html))
    }
}

impl ActiveDocument for HtmlSnapshot {
    fn locator(&self) -> Option<String> {
        Some(self.locator.clone())
    }

    fn snapshot(&self) -> Result<DomNode> {
        if self.html.trim().is_empty() {
            return Err(Error::Validation("snapshot is empty".to_string()));
        }
        Ok(DomNode::parse_html(&self.html))
    }
}
