//! Perplexity adapter.
//!
//! Threads are addressed by slug and listed with an opaque cursor. Thread
//! payloads are lists of query/answer records read by the normalizer.

use crate::adapter::{
    AdapterContext, CacheStats, ListingCallback, NativePage, PageSource, PageToken,
    PaginationCache, SourceAdapter, is_plausible_id, locator_segments,
};
use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::model::{Collection, ListPage, SourcePlatform, Thread, ThreadDetail};
use crate::normalize::{normalize_detail, normalize_entries, parse_timestamp};
use async_trait::async_trait;
use serde_json::Value;
use url::form_urlencoded;

pub const DEFAULT_BASE_URL: &str = "https://www.perplexity.ai";

const HOSTS: &[&str] = &["perplexity.ai", "www.perplexity.ai"];

#[derive(Debug, Clone)]
pub struct PerplexitySettings {
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub page_size: usize,
}

impl Default for PerplexitySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            page_size: 20,
        }
    }
}

pub struct PerplexityAdapter {
    ctx: AdapterContext,
    settings: PerplexitySettings,
    cache: PaginationCache,
}

impl PerplexityAdapter {
    #[must_use]
    pub fn new(ctx: AdapterContext, settings: PerplexitySettings) -> Self {
        let cache = ctx.new_cache();
        Self {
            ctx,
            settings,
            cache,
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        let url = format!("{}{path}", self.settings.base_url.trim_end_matches('/'));
        let request = HttpRequest::get(url);
        match &self.settings.session_cookie {
            Some(cookie) => request.with_header("Cookie", cookie.clone()),
            None => request,
        }
    }

    fn list_variants(&self, cursor: Option<&str>) -> Vec<HttpRequest> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("limit", &self.settings.page_size.to_string());
        if let Some(cursor) = cursor {
            query.append_pair("cursor", cursor);
        }
        let query = query.finish();
        vec![
            self.request(&format!("/rest/thread/list_ask_threads?{query}")),
            self.request(&format!("/rest/thread/list_recent?{query}")),
        ]
    }

    fn detail_variants(&self, slug: &str) -> Vec<HttpRequest> {
        vec![
            self.request(&format!(
                "/rest/thread/{slug}?with_schematized_response=true&limit=100"
            )),
            self.request(&format!("/rest/thread/{slug}?limit=100")),
            self.request(&format!("/rest/thread/{slug}")),
        ]
    }

    async fn fetch_detail_api(&self, slug: &str) -> Result<ThreadDetail> {
        let raw = self
            .ctx
            .fetch_json(SourcePlatform::Perplexity, &self.detail_variants(slug))
            .await?;
        parse_thread(slug, &raw)
    }
}

#[async_trait]
impl PageSource for PerplexityAdapter {
    async fn fetch_page(&self, token: &PageToken) -> Result<NativePage> {
        let cursor = match token {
            PageToken::Start => None,
            PageToken::Cursor(cursor) => Some(cursor.as_str()),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "perplexity pages by cursor, got {other:?}"
                )));
            }
        };
        let raw = self
            .ctx
            .fetch_json(SourcePlatform::Perplexity, &self.list_variants(cursor))
            .await?;

        let (records, next_cursor) = match &raw {
            Value::Array(records) => (records, None),
            Value::Object(map) => (
                map.get("threads")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::Validation("thread list has no threads".to_string()))?,
                map.get("next_cursor").and_then(Value::as_str),
            ),
            _ => return Err(Error::Validation("thread list is not an object".to_string())),
        };

        let items: Vec<Thread> = records.iter().filter_map(parse_thread_summary).collect();
        let next = next_cursor
            .filter(|c| !c.is_empty() && Some(*c) != cursor)
            .map(|c| PageToken::Cursor(c.to_string()));
        Ok(NativePage { items, next })
    }
}

#[async_trait]
impl SourceAdapter for PerplexityAdapter {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::Perplexity
    }

    fn identify(&self, locator: &str) -> Option<String> {
        match locator_segments(locator, HOSTS)?.as_slice() {
            [kind, slug] if (kind == "search" || kind == "thread") && is_plausible_id(slug) => {
                Some(slug.clone())
            }
            _ => None,
        }
    }

    async fn list_items(&self, offset: usize, limit: usize) -> Result<ListPage> {
        match self.cache.resolve(self, offset, limit).await {
            Ok(page) => Ok(page),
            Err(e) => self
                .ctx
                .degrade_listing(self.platform(), offset, limit, e, &|l| self.identify(l)),
        }
    }

    async fn list_all(&self, progress: Option<&ListingCallback<'_>>) -> Result<Vec<Thread>> {
        match self.cache.list_all(self, progress).await {
            Ok(items) => Ok(items),
            Err(e) => self
                .ctx
                .degrade_listing(self.platform(), 0, usize::MAX, e, &|l| self.identify(l))
                .map(|page| page.items),
        }
    }

    async fn fetch_detail(&self, id: &str) -> ThreadDetail {
        match self.fetch_detail_api(id).await {
            Ok(detail) => normalize_detail(detail),
            Err(e) => self
                .ctx
                .degrade_detail(self.platform(), id, &e, &|l| self.identify(l)),
        }
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let raw = self
            .ctx
            .fetch_json(
                SourcePlatform::Perplexity,
                &[self.request("/rest/collections/list_user_collections?limit=50&offset=0")],
            )
            .await?;
        let records = raw
            .as_array()
            .ok_or_else(|| Error::Validation("collection list is not an array".to_string()))?;
        Ok(records
            .iter()
            .filter_map(|c| {
                let id = c
                    .get("uuid")
                    .or_else(|| c.get("slug"))
                    .and_then(Value::as_str)?;
                Some(Collection {
                    id: id.to_string(),
                    title: c
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or("Untitled")
                        .to_string(),
                    description: c
                        .get("description")
                        .and_then(Value::as_str)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string),
                    thread_count: c
                        .get("thread_count")
                        .and_then(Value::as_u64)
                        .and_then(|n| usize::try_from(n).ok()),
                })
            })
            .collect())
    }

    async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

fn parse_thread_summary(record: &Value) -> Option<Thread> {
    let slug = record
        .get("slug")
        .or_else(|| record.get("uuid"))
        .and_then(Value::as_str)?;
    let title = record
        .get("title")
        .or_else(|| record.get("query_str"))
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("Untitled");
    Some(Thread {
        id: slug.to_string(),
        title: title.to_string(),
        source: SourcePlatform::Perplexity,
        last_activity: record
            .get("last_query_datetime")
            .or_else(|| record.get("updated_datetime"))
            .and_then(parse_timestamp),
    })
}

fn parse_thread(slug: &str, raw: &Value) -> Result<ThreadDetail> {
    let records = raw
        .get("entries")
        .and_then(Value::as_array)
        .or_else(|| raw.as_array())
        .ok_or_else(|| Error::Validation("thread payload has no entries".to_string()))?;

    let title = records
        .first()
        .and_then(|r| r.get("thread_title"))
        .or_else(|| raw.get("title"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let last_activity = records.iter().rev().find_map(|r| {
        r.get("updated_datetime")
            .or_else(|| r.get("entry_created_datetime"))
            .and_then(parse_timestamp)
    });

    let thread = Thread {
        id: slug.to_string(),
        title: title.to_string(),
        source: SourcePlatform::Perplexity,
        last_activity,
    };
    Ok(ThreadDetail::new(thread, normalize_entries(raw)))
}
