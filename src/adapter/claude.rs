//! Claude adapter.
//!
//! Conversations live under an organization. The listing endpoint returns
//! every conversation at once, so the adapter serves it as a single page.
//! Projects are exposed as collections.

use crate::adapter::{
    AdapterContext, CacheStats, ListingCallback, NativePage, PageSource, PageToken,
    PaginationCache, SourceAdapter, is_plausible_id, locator_segments,
};
use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::model::{Collection, ListPage, SourcePlatform, Thread, ThreadDetail};
use crate::normalize::{RoleMessage, TrailingRule, normalize_detail, pair_messages, parse_timestamp};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://claude.ai";

const HOSTS: &[&str] = &["claude.ai", "www.claude.ai"];

#[derive(Debug, Clone)]
pub struct ClaudeSettings {
    pub base_url: String,
    /// Discovered from `/api/organizations` when unset.
    pub organization_id: Option<String>,
    /// Raw `Cookie` header of a signed-in session.
    pub session_cookie: Option<String>,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            organization_id: None,
            session_cookie: None,
        }
    }
}

pub struct ClaudeAdapter {
    ctx: AdapterContext,
    settings: ClaudeSettings,
    cache: PaginationCache,
    organization: OnceCell<String>,
}

impl ClaudeAdapter {
    #[must_use]
    pub fn new(ctx: AdapterContext, settings: ClaudeSettings) -> Self {
        let cache = ctx.new_cache();
        let organization = settings
            .organization_id
            .clone()
            .filter(|o| !o.trim().is_empty())
            .map_or_else(OnceCell::new, |o| OnceCell::new_with(Some(o)));
        Self {
            ctx,
            settings,
            cache,
            organization,
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

    async fn organization(&self) -> Result<&str> {
        let org = self
            .organization
            .get_or_try_init(|| async {
                let raw = self
                    .ctx
                    .fetch_json(SourcePlatform::Claude, &[self.request("/api/organizations")])
                    .await?;
                let org = raw
                    .as_array()
                    .and_then(|orgs| orgs.first())
                    .and_then(|o| o.get("uuid"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Config("no claude organization visible to this session".to_string())
                    })?;
                debug!(organization = org, "discovered claude organization");
                Ok::<_, Error>(org.to_string())
            })
            .await?;
        Ok(org.as_str())
    }

    async fn detail_variants(&self, id: &str) -> Result<Vec<HttpRequest>> {
        let base = format!("/api/organizations/{}/chat_conversations/{id}", self.organization().await?);
        Ok(vec![
            self.request(&format!("{base}?tree=True&rendering_mode=messages")),
            self.request(&format!("{base}?rendering_mode=messages")),
            self.request(&base),
        ])
    }

    async fn fetch_detail_api(&self, id: &str) -> Result<ThreadDetail> {
        let variants = self.detail_variants(id).await?;
        let raw = self.ctx.fetch_json(SourcePlatform::Claude, &variants).await?;
        parse_conversation(id, &raw)
    }
}

#[async_trait]
impl PageSource for ClaudeAdapter {
    async fn fetch_page(&self, token: &PageToken) -> Result<NativePage> {
        if *token != PageToken::Start {
            return Err(Error::InvalidArgument(format!(
                "claude listing is a single page, got {token:?}"
            )));
        }
        let base = format!("/api/organizations/{}", self.organization().await?);
        let variants = [
            self.request(&format!("{base}/chat_conversations")),
            self.request(&format!("{base}/chat_conversations_v2")),
        ];
        let raw = self.ctx.fetch_json(SourcePlatform::Claude, &variants).await?;
        let mut items = parse_conversation_list(&raw)?;
        items.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(NativePage { items, next: None })
    }
}

#[async_trait]
impl SourceAdapter for ClaudeAdapter {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::Claude
    }

    fn identify(&self, locator: &str) -> Option<String> {
        match locator_segments(locator, HOSTS)?.as_slice() {
            [chat, id] if chat == "chat" && is_plausible_id(id) => Some(id.clone()),
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
        let path = format!("/api/organizations/{}/projects", self.organization().await?);
        let raw = self
            .ctx
            .fetch_json(SourcePlatform::Claude, &[self.request(&path)])
            .await?;
        let projects = raw
            .as_array()
            .ok_or_else(|| Error::Validation("project list is not an array".to_string()))?;
        Ok(projects
            .iter()
            .filter_map(|p| {
                Some(Collection {
                    id: p.get("uuid").and_then(Value::as_str)?.to_string(),
                    title: p
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("Untitled")
                        .to_string(),
                    description: p
                        .get("description")
                        .and_then(Value::as_str)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string),
                    thread_count: None,
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

fn parse_conversation_list(raw: &Value) -> Result<Vec<Thread>> {
    let items = raw
        .as_array()
        .or_else(|| raw.get("data").and_then(Value::as_array))
        .ok_or_else(|| Error::Validation("conversation list is not an array".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.get("uuid").and_then(Value::as_str)?;
            let title = item
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("Untitled");
            Some(Thread {
                id: id.to_string(),
                title: title.to_string(),
                source: SourcePlatform::Claude,
                last_activity: item.get("updated_at").and_then(parse_timestamp),
            })
        })
        .collect())
}

fn parse_conversation(id: &str, raw: &Value) -> Result<ThreadDetail> {
    let messages: Vec<RoleMessage> = raw
        .get("chat_messages")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("conversation has no chat_messages".to_string()))?
        .iter()
        .filter_map(RoleMessage::from_json)
        .collect();

    let thread = Thread {
        id: id.to_string(),
        title: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source: SourcePlatform::Claude,
        last_activity: raw.get("updated_at").and_then(parse_timestamp),
    };
    Ok(ThreadDetail::new(
        thread,
        pair_messages(&messages, TrailingRule::Drop),
    ))
}
