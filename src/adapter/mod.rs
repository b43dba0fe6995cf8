//! Source adapters.
//!
//! One adapter per platform implements [`SourceAdapter`]. Every network
//! read goes through the endpoint fallback chain ([`fallback`]); listings
//! go through a per-adapter [`PaginationCache`]. When the network is
//! exhausted, the adapter degrades to structural extraction from the
//! active document, and only for the item that document shows.
//!
//! # Submodules
//!
//! - [`chatgpt`] - Offset-paginated conversations with a message tree
//! - [`claude`] - Unpaginated conversations, projects as collections
//! - [`perplexity`] - Cursor-paginated threads, collections
//! - [`fallback`] - Endpoint variants and backoff
//! - [`pagination`] - Offset/cursor cache
//! - [`registry`] - Platform → adapter lookup

pub mod chatgpt;
pub mod claude;
pub mod fallback;
pub mod pagination;
pub mod perplexity;
pub mod registry;

pub use fallback::{BackoffPolicy, fetch_json_with_fallback};
pub use pagination::{
    CacheStats, ListingCallback, ListingProgress, NativePage, PageSource, PageToken,
    PaginationCache, PaginationSettings,
};
pub use registry::AdapterRegistry;

use crate::clock::SharedClock;
use crate::dom::{ActiveDocument, DomNode, StructuralExtractor, default_extractors, extract_entries};
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::model::{Collection, ExtractionMode, ListPage, SourcePlatform, Thread, ThreadDetail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Uniform capability set of a chat platform.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> SourcePlatform;

    /// Thread id encoded in a locator (URL), or `None` if it is not one of
    /// this platform's thread URLs. Pure.
    fn identify(&self, locator: &str) -> Option<String>;

    /// One page of thread summaries, newest activity first.
    async fn list_items(&self, offset: usize, limit: usize) -> Result<ListPage>;

    /// Every thread summary, up to the listing caps.
    async fn list_all(&self, progress: Option<&ListingCallback<'_>>) -> Result<Vec<Thread>>;

    /// Full entries of one thread.
    ///
    /// Never fails: when every channel is exhausted the detail carries the
    /// reason and no entries.
    async fn fetch_detail(&self, id: &str) -> ThreadDetail;

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(Vec::new())
    }

    async fn invalidate_cache(&self);

    async fn cache_stats(&self) -> CacheStats;
}

/// Shared collaborators of every adapter.
#[derive(Clone)]
pub struct AdapterContext {
    pub transport: Arc<dyn HttpTransport>,
    pub clock: SharedClock,
    pub backoff: BackoffPolicy,
    pub pagination: PaginationSettings,
    pub document: Option<Arc<dyn ActiveDocument>>,
    pub extractors: Arc<Vec<Box<dyn StructuralExtractor>>>,
}

impl AdapterContext {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: SharedClock) -> Self {
        Self {
            transport,
            clock,
            backoff: BackoffPolicy::default(),
            pagination: PaginationSettings::default(),
            document: None,
            extractors: Arc::new(default_extractors()),
        }
    }

    #[must_use]
    pub fn with_document(mut self, document: Arc<dyn ActiveDocument>) -> Self {
        self.document = Some(document);
        self
    }

    pub(crate) fn new_cache(&self) -> PaginationCache {
        PaginationCache::new(Arc::clone(&self.clock), self.pagination)
    }

    /// Run the fallback chain for `platform`.
    pub(crate) async fn fetch_json(
        &self,
        platform: SourcePlatform,
        variants: &[HttpRequest],
    ) -> Result<Value> {
        fetch_json_with_fallback(
            self.transport.as_ref(),
            self.clock.as_ref(),
            &self.backoff,
            platform.as_str(),
            variants,
        )
        .await
    }

    /// The active document, if its locator identifies as thread `id`.
    fn active_document_for(
        &self,
        id: &str,
        identify: &dyn Fn(&str) -> Option<String>,
    ) -> Option<&Arc<dyn ActiveDocument>> {
        let document = self.document.as_ref()?;
        let locator = document.locator()?;
        (identify(&locator).as_deref() == Some(id)).then_some(document)
    }

    /// Degrade a failed detail fetch.
    ///
    /// Structural extraction is attempted only when the active document is
    /// thread `id`; otherwise the detail is marked failed with the network
    /// error.
    pub(crate) fn degrade_detail(
        &self,
        platform: SourcePlatform,
        id: &str,
        error: &Error,
        identify: &dyn Fn(&str) -> Option<String>,
    ) -> ThreadDetail {
        let thread = Thread::new(id, "", platform);
        let Some(document) = self.active_document_for(id, identify) else {
            debug!(%platform, id, error = %error, "detail fetch failed; no document fallback");
            return ThreadDetail::failed(thread, error.reason());
        };

        let root = match document.snapshot() {
            Ok(root) => root,
            Err(e) => {
                return ThreadDetail::failed(
                    thread,
                    format!("{}; document snapshot failed: {e}", error.reason()),
                );
            }
        };

        match extract_entries(&root, &self.extractors) {
            Some(extraction) => {
                warn!(
                    %platform,
                    id,
                    strategy = extraction.strategy,
                    entries = extraction.entries.len(),
                    "degraded extraction from document"
                );
                let title = document_title(&root).unwrap_or_default();
                ThreadDetail {
                    thread: Thread { title, ..thread },
                    entries: extraction.entries,
                    extraction: ExtractionMode::Dom,
                    error: None,
                }
            }
            None => ThreadDetail::failed(
                thread,
                format!("{}; document fallback found no entries", error.reason()),
            ),
        }
    }

    /// Degrade a failed listing: thread links found in the active document.
    ///
    /// # Errors
    ///
    /// Returns `error` unchanged when there is no document or it links to
    /// no threads of this platform.
    pub(crate) fn degrade_listing(
        &self,
        platform: SourcePlatform,
        offset: usize,
        limit: usize,
        error: Error,
        identify: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ListPage> {
        // Auth failures must reach the user.
        if matches!(error, Error::Auth { .. }) {
            return Err(error);
        }
        let Some(document) = self.document.as_ref() else {
            return Err(error);
        };
        let Ok(root) = document.snapshot() else {
            return Err(error);
        };
        let base = document.locator().and_then(|l| Url::parse(&l).ok());
        let threads = threads_from_links(&root, base.as_ref(), platform, identify);
        if threads.is_empty() {
            return Err(error);
        }

        warn!(%platform, found = threads.len(), error = %error, "listing degraded to document links");
        let has_more = offset.saturating_add(limit) < threads.len();
        Ok(ListPage {
            items: threads.into_iter().skip(offset).take(limit).collect(),
            has_more,
        })
    }
}

/// Text of the document `<title>`, without a trailing " | Site" suffix.
fn document_title(root: &DomNode) -> Option<String> {
    let title = root.find("title")?.text_content();
    let title = title
        .rsplit_once(" | ")
        .or_else(|| title.rsplit_once(" - "))
        .map_or(title.as_str(), |(head, _)| head)
        .trim()
        .to_string();
    (!title.is_empty()).then_some(title)
}

/// Threads linked from a document, in document order, deduplicated.
fn threads_from_links(
    root: &DomNode,
    base: Option<&Url>,
    platform: SourcePlatform,
    identify: &dyn Fn(&str) -> Option<String>,
) -> Vec<Thread> {
    let mut seen = HashSet::new();
    root.find_all("a")
        .into_iter()
        .filter_map(|anchor| {
            let href = anchor.attr("href")?;
            let absolute = match base {
                Some(base) => base.join(href).ok()?.to_string(),
                None => href.to_string(),
            };
            let id = identify(&absolute)?;
            seen.insert(id.clone())
                .then(|| Thread::new(id, anchor.text_content(), platform))
        })
        .collect()
}

/// Parse a locator and check its host against `hosts`.
///
/// Returns the path segments on a match.
pub(crate) fn locator_segments(locator: &str, hosts: &[&str]) -> Option<Vec<String>> {
    let url = Url::parse(locator.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    if !hosts.contains(&host.as_str()) {
        return None;
    }
    Some(
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Whether `id` looks like an opaque identifier (no separators or spaces).
pub(crate) fn is_plausible_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dom::HtmlSnapshot;
    use crate::http::MockTransport;

    fn identify(locator: &str) -> Option<String> {
        locator_segments(locator, &["chat.test"])
            .and_then(|s| (s.len() == 2 && s[0] == "c").then(|| s[1].clone()))
    }

    fn ctx(document: Option<HtmlSnapshot>) -> AdapterContext {
        let ctx = AdapterContext::new(
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::at_epoch(0)),
        );
        match document {
            Some(doc) => ctx.with_document(Arc::new(doc)),
            None => ctx,
        }
    }

    const PAGE: &str = r#"<html><head><title>Borrowing | Chat</title></head><body>
        <nav><a href="/c/one">Borrowing</a><a href="/c/two">Traits</a><a href="/about">About</a></nav>
        <main>
          <div data-message-author-role="user">What is a borrow?</div>
          <div data-message-author-role="assistant">A reference.</div>
        </main></body></html>"#;

    #[test]
    fn test_degrade_uses_document_only_for_active_item() {
        let ctx = ctx(Some(HtmlSnapshot::new("https://chat.test/c/one", PAGE)));
        let err = Error::Transport("down".into());

        let detail = ctx.degrade_detail(SourcePlatform::ChatGpt, "one", &err, &identify);
        assert!(detail.is_degraded());
        assert_eq!(detail.thread.title, "Borrowing");
        assert_eq!(detail.entries.len(), 1);

        let other = ctx.degrade_detail(SourcePlatform::ChatGpt, "two", &err, &identify);
        assert!(other.is_failed());
        assert!(other.entries.is_empty());
        assert!(other.error.unwrap().starts_with("TRANSPORT_ERROR"));
    }

    #[test]
    fn test_degrade_without_document_fails_item() {
        let ctx = ctx(None);
        let detail = ctx.degrade_detail(
            SourcePlatform::ChatGpt,
            "one",
            &Error::not_found("/x"),
            &identify,
        );
        assert!(detail.is_failed());
    }

    #[test]
    fn test_listing_degrades_to_document_links() {
        let ctx = ctx(Some(HtmlSnapshot::new("https://chat.test/c/one", PAGE)));
        let page = ctx
            .degrade_listing(
                SourcePlatform::ChatGpt,
                0,
                10,
                Error::Transport("down".into()),
                &identify,
            )
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
        assert_eq!(page.items[1].title, "Traits");
        assert!(!page.has_more);
    }

    #[test]
    fn test_listing_auth_error_is_not_masked() {
        let ctx = ctx(Some(HtmlSnapshot::new("https://chat.test/c/one", PAGE)));
        let err = ctx
            .degrade_listing(
                SourcePlatform::ChatGpt,
                0,
                10,
                Error::auth("chatgpt", 401, "expired"),
                &identify,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_locator_segments_checks_scheme_and_host() {
        assert_eq!(
            locator_segments("https://chat.test/c/abc?x=1", &["chat.test"]),
            Some(vec!["c".to_string(), "abc".to_string()])
        );
        assert_eq!(locator_segments("ftp://chat.test/c/abc", &["chat.test"]), None);
        assert_eq!(locator_segments("https://evil.test/c/abc", &["chat.test"]), None);
        assert_eq!(locator_segments("not a url", &["chat.test"]), None);
    }
}
