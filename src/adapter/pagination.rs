//! Offset → native pagination mapping with a bounded-TTL cache.
//!
//! Sources paginate by offset, page number, opaque forward-only cursor, or
//! not at all. [`PaginationCache`] exposes a uniform `(offset, limit)` view
//! over any [`PageSource`]:
//!
//! - Breakpoints record which native token starts the page at a given
//!   cumulative index, so a cold request resumes from the nearest one
//!   instead of page one.
//! - Fetched pages and the full listing are kept for a fixed TTL; a range
//!   covered by fresh pages never hits the network.
//! - Consecutive network fetches are spaced by a random 150–300 ms delay.

use crate::clock::SharedClock;
use crate::error::Result;
use crate::model::{ListPage, Thread};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Native position of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// First page, whatever the scheme.
    Start,
    /// Item offset.
    Offset(usize),
    /// 1-based page number.
    Page(u32),
    /// Opaque forward-only cursor.
    Cursor(String),
}

/// One page as returned by a source.
#[derive(Debug, Clone)]
pub struct NativePage {
    pub items: Vec<Thread>,
    /// Token of the following page; `None` when this is the last one.
    pub next: Option<PageToken>,
}

/// A source of native pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, token: &PageToken) -> Result<NativePage>;
}

/// Progress of a full listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListingProgress {
    pub pages_fetched: usize,
    pub items_seen: usize,
}

/// Listing progress callback. May borrow from the caller.
pub type ListingCallback<'a> = dyn Fn(ListingProgress) + Send + Sync + 'a;

/// Limits and pacing for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    pub ttl: Duration,
    pub max_items: usize,
    pub max_pages: usize,
    pub min_page_delay: Duration,
    pub max_page_delay: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_items: 5_000,
            max_pages: 100,
            min_page_delay: Duration::from_millis(150),
            max_page_delay: Duration::from_millis(300),
        }
    }
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub breakpoints: usize,
    pub cached_pages: usize,
    pub full_listing_items: Option<usize>,
    pub network_fetches: usize,
}

#[derive(Debug, Clone)]
struct CachedPage {
    items: Vec<Thread>,
    next: Option<PageToken>,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FullListing {
    items: Vec<Thread>,
    /// False when a cap cut the walk short of the source's last page.
    exhausted: bool,
    fetched_at: DateTime<Utc>,
}

impl FullListing {
    fn covers(&self, end: usize) -> bool {
        self.exhausted || end <= self.items.len()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Cumulative index → token of the page starting there.
    breakpoints: BTreeMap<usize, PageToken>,
    /// Start index → page.
    pages: BTreeMap<usize, CachedPage>,
    full: Option<FullListing>,
    network_fetches: usize,
    fetched_this_call: bool,
}

/// Process-wide pagination cache for one source.
///
/// All access goes through `resolve`, `list_all` and `invalidate`, which
/// hold the internal lock for the duration of the call.
pub struct PaginationCache {
    clock: SharedClock,
    settings: PaginationSettings,
    state: Mutex<CacheState>,
}

impl PaginationCache {
    #[must_use]
    pub fn new(clock: SharedClock, settings: PaginationSettings) -> Self {
        Self {
            clock,
            settings,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.ttl).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>) -> bool {
        self.clock.now() - fetched_at < self.ttl()
    }

    fn page_delay(&self) -> Duration {
        let min = self.settings.min_page_delay.as_millis();
        let max = self.settings.max_page_delay.as_millis().max(min);
        let millis = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// The page starting at `index`, from cache when fresh.
    async fn page_at(
        &self,
        state: &mut CacheState,
        source: &dyn PageSource,
        index: usize,
        token: &PageToken,
    ) -> Result<CachedPage> {
        if let Some(page) = state.pages.get(&index) {
            if self.is_fresh(page.fetched_at) {
                return Ok(page.clone());
            }
        }

        if state.fetched_this_call {
            self.clock.sleep(self.page_delay()).await;
        }
        state.fetched_this_call = true;
        state.network_fetches += 1;
        debug!(index, ?token, "fetching page");

        let native = source.fetch_page(token).await?;
        let page = CachedPage {
            items: native.items,
            next: native.next,
            fetched_at: self.clock.now(),
        };
        state.pages.insert(index, page.clone());
        if let Some(next) = page.next.as_ref().filter(|_| !page.items.is_empty()) {
            state
                .breakpoints
                .insert(index + page.items.len(), next.clone());
        }
        Ok(page)
    }

    /// Items `[offset, offset + limit)` in listing order.
    ///
    /// # Errors
    ///
    /// Propagates the source error of the first page fetch that fails.
    pub async fn resolve(
        &self,
        source: &dyn PageSource,
        offset: usize,
        limit: usize,
    ) -> Result<ListPage> {
        let mut state = self.state.lock().await;
        state.fetched_this_call = false;
        let end = offset.saturating_add(limit);

        if let Some(full) = state
            .full
            .as_ref()
            .filter(|f| self.is_fresh(f.fetched_at) && f.covers(end))
        {
            let items = full.items.iter().skip(offset).take(limit).cloned().collect();
            return Ok(ListPage {
                items,
                has_more: end < full.items.len() || !full.exhausted,
            });
        }
        if limit == 0 {
            return Ok(ListPage::default());
        }

        let (mut index, mut token) = state
            .breakpoints
            .range(..=offset)
            .next_back()
            .map_or((0, PageToken::Start), |(i, t)| (*i, t.clone()));

        let mut items = Vec::new();
        let mut has_more = true;
        while index < end {
            let page = self.page_at(&mut state, source, index, &token).await?;
            let page_end = index + page.items.len();
            items.extend(
                page.items
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| (offset..end).contains(&(index + i)))
                    .map(|(_, t)| t.clone()),
            );
            match page.next {
                Some(next) if !page.items.is_empty() => {
                    index = page_end;
                    token = next;
                }
                _ => {
                    has_more = false;
                    break;
                }
            }
        }

        Ok(ListPage { items, has_more })
    }

    /// Every item, deduplicated by id, up to the item and page caps.
    ///
    /// An error after some items were collected ends the walk early and
    /// returns what was gathered.
    ///
    /// # Errors
    ///
    /// Returns the source error only when it occurs before any item was seen.
    pub async fn list_all(
        &self,
        source: &dyn PageSource,
        progress: Option<&ListingCallback<'_>>,
    ) -> Result<Vec<Thread>> {
        let mut state = self.state.lock().await;
        state.fetched_this_call = false;

        if let Some(full) = state.full.as_ref().filter(|f| self.is_fresh(f.fetched_at)) {
            return Ok(full.items.clone());
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<Thread> = Vec::new();
        let mut index = 0usize;
        let mut token = PageToken::Start;
        let mut pages = 0usize;
        let mut complete = true;
        let mut exhausted = false;

        loop {
            if pages >= self.settings.max_pages || items.len() >= self.settings.max_items {
                warn!(pages, items = items.len(), "listing cap reached");
                break;
            }

            let page = match self.page_at(&mut state, source, index, &token).await {
                Ok(page) => page,
                Err(e) if items.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, items = items.len(), "listing stopped early");
                    complete = false;
                    break;
                }
            };
            pages += 1;

            for thread in &page.items {
                if items.len() >= self.settings.max_items {
                    break;
                }
                if seen.insert(thread.id.clone()) {
                    items.push(thread.clone());
                }
            }

            if let Some(cb) = progress {
                cb(ListingProgress {
                    pages_fetched: pages,
                    items_seen: items.len(),
                });
            }

            match page.next {
                Some(next) if !page.items.is_empty() => {
                    index += page.items.len();
                    token = next;
                }
                _ => {
                    exhausted = true;
                    break;
                }
            }
        }

        if complete {
            state.full = Some(FullListing {
                items: items.clone(),
                exhausted,
                fetched_at: self.clock.now(),
            });
        }
        Ok(items)
    }

    /// Drop every cached page, breakpoint and the full listing.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.breakpoints.clear();
        state.pages.clear();
        state.full = None;
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            breakpoints: state.breakpoints.len(),
            cached_pages: state.pages.len(),
            full_listing_items: state.full.as_ref().map(|f| f.items.len()),
            network_fetches: state.network_fetches,
        }
    }
}
