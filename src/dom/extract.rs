//! Ranked structural extractors.
//!
//! Each extractor turns a document into role-attributed messages; the
//! first extractor whose messages pair into at least one entry wins.

use crate::dom::DomNode;
use crate::model::Entry;
use crate::normalize::{Role, RoleMessage, TrailingRule, clean_entries, pair_messages};

/// A strategy for finding conversation turns in a document tree.
pub trait StructuralExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Messages in document order.
    fn messages(&self, root: &DomNode) -> Vec<RoleMessage>;
}

/// Result of a successful structural extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub strategy: &'static str,
    pub entries: Vec<Entry>,
}

/// The default ranking: explicit role attributes, class names, then
/// alternating blocks.
#[must_use]
pub fn default_extractors() -> Vec<Box<dyn StructuralExtractor>> {
    vec![
        Box::new(RoleAttributeExtractor::default()),
        Box::new(ClassNameExtractor::default()),
        Box::new(AlternatingBlockExtractor::default()),
    ]
}

/// Run extractors in order, stopping at the first that yields entries.
#[must_use]
pub fn extract_entries(
    root: &DomNode,
    extractors: &[Box<dyn StructuralExtractor>],
) -> Option<Extraction> {
    extractors.iter().find_map(|extractor| {
        let messages = extractor.messages(root);
        let entries = clean_entries(pair_messages(&messages, TrailingRule::Drop));
        tracing::debug!(
            strategy = extractor.name(),
            messages = messages.len(),
            entries = entries.len(),
            "structural extraction attempt"
        );
        if entries.is_empty() {
            None
        } else {
            Some(Extraction {
                strategy: extractor.name(),
                entries,
            })
        }
    })
}

/// Walk the tree; `classify` either claims a node as a message (its subtree
/// is not visited further) or lets the walk descend.
fn collect_claimed(
    node: &DomNode,
    classify: &dyn Fn(&DomNode) -> Option<Role>,
    out: &mut Vec<RoleMessage>,
) {
    if node.is_text() {
        return;
    }
    if let Some(role) = classify(node) {
        out.push(RoleMessage::new(role, node.text_content()));
        return;
    }
    for child in &node.children {
        collect_claimed(child, classify, out);
    }
}

// ── Role attributes ───────────────────────────────────────────

/// Elements carrying an explicit author attribute.
pub struct RoleAttributeExtractor {
    attributes: Vec<&'static str>,
}

impl Default for RoleAttributeExtractor {
    fn default() -> Self {
        Self {
            attributes: vec![
                "data-message-author-role",
                "data-author-role",
                "data-role",
                "data-author",
                "data-sender",
            ],
        }
    }
}

impl StructuralExtractor for RoleAttributeExtractor {
    fn name(&self) -> &'static str {
        "role-attribute"
    }

    fn messages(&self, root: &DomNode) -> Vec<RoleMessage> {
        let classify = |node: &DomNode| {
            self.attributes
                .iter()
                .find_map(|attr| node.attr(attr))
                .map(Role::from_label)
                .filter(|role| *role != Role::Other)
        };
        let mut out = Vec::new();
        collect_claimed(root, &classify, &mut out);
        out
    }
}

// ── Class names ───────────────────────────────────────────────

/// Elements whose class tokens name the author.
pub struct ClassNameExtractor {
    user_markers: Vec<&'static str>,
    assistant_markers: Vec<&'static str>,
}

impl Default for ClassNameExtractor {
    fn default() -> Self {
        Self {
            user_markers: vec![
                "user-message",
                "human-message",
                "font-user-message",
                "query",
                "question",
                "prompt",
            ],
            assistant_markers: vec![
                "assistant-message",
                "bot-message",
                "font-claude-message",
                "answer",
                "response",
                "markdown",
                "prose",
            ],
        }
    }
}

impl StructuralExtractor for ClassNameExtractor {
    fn name(&self) -> &'static str {
        "class-name"
    }

    fn messages(&self, root: &DomNode) -> Vec<RoleMessage> {
        let classify = |node: &DomNode| {
            let classes = node.classes();
            let has = |markers: &[&str]| {
                classes
                    .iter()
                    .any(|class| markers.iter().any(|m| class.contains(m)))
            };
            if has(&self.user_markers) {
                Some(Role::User)
            } else if has(&self.assistant_markers) {
                Some(Role::Assistant)
            } else {
                None
            }
        };
        let mut out = Vec::new();
        collect_claimed(root, &classify, &mut out);
        out
    }
}

// ── Alternating blocks ────────────────────────────────────────

/// Last resort: the container with the most text-bearing children is read
/// as alternating query (odd) and answer (even) blocks.
pub struct AlternatingBlockExtractor {
    min_blocks: usize,
}

impl Default for AlternatingBlockExtractor {
    fn default() -> Self {
        Self { min_blocks: 2 }
    }
}

impl AlternatingBlockExtractor {
    fn best_container<'a>(&self, node: &'a DomNode, best: &mut Option<(&'a DomNode, usize)>) {
        if node.is_text() {
            return;
        }
        let blocks = node
            .elements()
            .filter(|c| !c.text_content().is_empty())
            .count();
        if blocks >= self.min_blocks && best.is_none_or(|(_, count)| blocks > count) {
            *best = Some((node, blocks));
        }
        for child in node.elements() {
            self.best_container(child, best);
        }
    }
}

impl StructuralExtractor for AlternatingBlockExtractor {
    fn name(&self) -> &'static str {
        "alternating-blocks"
    }

    fn messages(&self, root: &DomNode) -> Vec<RoleMessage> {
        let mut best = None;
        self.best_container(root, &mut best);
        let Some((container, _)) = best else {
            return Vec::new();
        };
        container
            .elements()
            .map(DomNode::text_content)
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(i, text)| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                RoleMessage::new(role, text)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(attr: &str, role: &str, text: &str) -> DomNode {
        DomNode::element("div")
            .with_attr(attr, role)
            .with_child(DomNode::with_text("p", text))
    }

    #[test]
    fn test_role_attributes_win_first() {
        let root = DomNode::element("main")
            .with_child(turn("data-message-author-role", "user", "q1"))
            .with_child(turn("data-message-author-role", "assistant", "a1"))
            .with_child(turn("data-message-author-role", "user", "q2"));
        let extraction = extract_entries(&root, &default_extractors()).unwrap();
        assert_eq!(extraction.strategy, "role-attribute");
        assert_eq!(extraction.entries, vec![Entry::new("q1", "a1")]);
    }

    #[test]
    fn test_claimed_nodes_are_not_descended() {
        // The nested assistant marker belongs to the user's turn text.
        let root = DomNode::element("main")
            .with_child(
                DomNode::element("div")
                    .with_attr("data-role", "user")
                    .with_child(turn("data-role", "assistant", "quoted")),
            )
            .with_child(turn("data-role", "assistant", "real answer"));
        let messages = RoleAttributeExtractor::default().messages(&root);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "real answer");
    }

    #[test]
    fn test_class_names_used_when_no_role_attributes() {
        let root = DomNode::element("main")
            .with_child(DomNode::with_text("div", "Explain lifetimes").with_attr("class", "font-user-message"))
            .with_child(DomNode::with_text("div", "They scope borrows.").with_attr("class", "font-claude-message prose"));
        let extraction = extract_entries(&root, &default_extractors()).unwrap();
        assert_eq!(extraction.strategy, "class-name");
        assert_eq!(
            extraction.entries,
            vec![Entry::new("Explain lifetimes", "They scope borrows.")]
        );
    }

    #[test]
    fn test_alternating_blocks_fallback() {
        let list = DomNode::element("section")
            .with_child(DomNode::with_text("div", "q1"))
            .with_child(DomNode::with_text("div", "a1"))
            .with_child(DomNode::with_text("div", "q2"))
            .with_child(DomNode::with_text("div", "a2"))
            .with_child(DomNode::with_text("div", "q3"));
        let root = DomNode::element("body")
            .with_child(DomNode::with_text("header", "Site"))
            .with_child(list);
        let extraction = extract_entries(&root, &default_extractors()).unwrap();
        assert_eq!(extraction.strategy, "alternating-blocks");
        assert_eq!(
            extraction.entries,
            vec![Entry::new("q1", "a1"), Entry::new("q2", "a2")]
        );
    }

    #[test]
    fn test_empty_document_extracts_nothing() {
        let root = DomNode::element("body").with_child(DomNode::with_text("p", "only one block"));
        assert!(extract_entries(&root, &default_extractors()).is_none());
    }
}
