//! Generic document tree for the structural fallback.
//!
//! Extractors work on [`DomNode`], an owned tree independent of any
//! rendering engine. HTML snapshots are converted with `scraper`; tests
//! build synthetic trees directly.

pub mod document;
pub mod extract;

pub use document::{ActiveDocument, HtmlSnapshot};
pub use extract::{
    AlternatingBlockExtractor, ClassNameExtractor, Extraction, RoleAttributeExtractor,
    StructuralExtractor, default_extractors, extract_entries,
};

use scraper::{ElementRef, Html};
use std::collections::BTreeMap;

/// Tag name used for text nodes.
pub const TEXT_TAG: &str = "#text";

/// Elements whose content is never visible text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// A node in a document tree: an element or a text node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<DomNode>,
    /// Content of a text node; `None` for elements.
    pub text: Option<String>,
}

impl DomNode {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            text: Some(content.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: DomNode) -> Self {
        self.children.push(child);
        self
    }

    /// Element with a single text child.
    pub fn with_text(tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self::element(tag).with_child(Self::text(content))
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Class tokens, lowercased.
    #[must_use]
    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_ascii_lowercase).collect())
            .unwrap_or_default()
    }

    /// Element children (text nodes excluded).
    pub fn elements(&self) -> impl Iterator<Item = &DomNode> {
        self.children.iter().filter(|c| !c.is_text())
    }

    /// First element with the given tag, in document order.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<&DomNode> {
        if !self.is_text() && self.tag == tag {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(tag))
    }

    /// Every element with the given tag, in document order.
    #[must_use]
    pub fn find_all(&self, tag: &str) -> Vec<&DomNode> {
        std::iter::once(self)
            .chain(self.descendants())
            .filter(|node| !node.is_text() && node.tag == tag)
            .collect()
    }

    /// Every element below this node, depth-first in document order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&DomNode> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a DomNode>) {
        for child in self.elements() {
            out.push(child);
            child.collect_descendants(out);
        }
    }

    /// Visible text of this subtree with whitespace runs collapsed.
    ///
    /// Block-level boundaries become line breaks so paragraphs survive.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
            return;
        }
        let block = matches!(
            self.tag.as_str(),
            "p" | "div" | "li" | "br" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "tr"
        );
        if block {
            out.push('\n');
        }
        for child in &self.children {
            child.collect_text(out);
        }
        if block {
            out.push('\n');
        }
    }

    /// Parse an HTML document into a tree rooted at `<html>`.
    #[must_use]
    pub fn parse_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        convert_element(document.root_element())
    }
}

fn convert_element(element: ElementRef<'_>) -> DomNode {
    let value = element.value();
    let mut node = DomNode::element(value.name());
    for (name, attr) in value.attrs() {
        node.attributes.insert(name.to_string(), attr.to_string());
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if SKIPPED_TAGS.contains(&child_element.value().name()) {
                continue;
            }
            node.children.push(convert_element(child_element));
        } else if let Some(text) = child.value().as_text() {
            let content: &str = text;
            if !content.trim().is_empty() {
                node.children.push(DomNode::text(content));
            }
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_keeps_structure_and_attributes() {
        let root = DomNode::parse_html(
            r#"<html><body><div class="Turn User" data-role="user">Hi <b>there</b></div>
               <script>var x = 1;</script></body></html>"#,
        );
        assert_eq!(root.tag, "html");
        let body = root.elements().find(|n| n.tag == "body").unwrap();
        let div = body.elements().next().unwrap();
        assert_eq!(div.attr("data-role"), Some("user"));
        assert_eq!(div.classes(), vec!["turn", "user"]);
        assert_eq!(div.text_content(), "Hi there");
        assert!(!body.text_content().contains("var x"));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = DomNode::element("main")
            .with_child(DomNode::element("section").with_child(DomNode::with_text("p", "a")))
            .with_child(DomNode::with_text("p", "b"));
        let tags: Vec<_> = root.descendants().iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, vec!["section", "p", "p"]);
        assert_eq!(root.find_all("p").len(), 2);
    }

    #[test]
    fn test_text_content_keeps_paragraph_breaks() {
        let node = DomNode::element("div")
            .with_child(DomNode::with_text("p", "first   line"))
            .with_child(DomNode::with_text("p", "second"));
        assert_eq!(node.text_content(), "first line\nsecond");
    }
}
