//! ChatGPT adapter.
//!
//! Conversations are listed by offset; a conversation is a message tree
//! (`mapping`) whose active branch is found by walking `parent` links up
//! from `current_node`.

use crate::adapter::{
    AdapterContext, CacheStats, ListingCallback, NativePage, PageSource, PageToken,
    PaginationCache, SourceAdapter, is_plausible_id, locator_segments,
};
use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::model::{ListPage, SourcePlatform, Thread, ThreadDetail};
use crate::normalize::{RoleMessage, TrailingRule, normalize_detail, pair_messages, parse_timestamp};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://chatgpt.com";

const HOSTS: &[&str] = &["chatgpt.com", "www.chatgpt.com", "chat.openai.com"];

#[derive(Debug, Clone)]
pub struct ChatGptSettings {
    pub base_url: String,
    /// Bearer token of the web session.
    pub access_token: Option<String>,
    pub page_size: usize,
}

impl Default for ChatGptSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            page_size: 28,
        }
    }
}

pub struct ChatGptAdapter {
    ctx: AdapterContext,
    settings: ChatGptSettings,
    cache: PaginationCache,
}

impl ChatGptAdapter {
    #[must_use]
    pub fn new(ctx: AdapterContext, settings: ChatGptSettings) -> Self {
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
        match &self.settings.access_token {
            Some(token) => request.with_header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn list_variants(&self, offset: usize, limit: usize) -> Vec<HttpRequest> {
        vec![
            self.request(&format!(
                "/backend-api/conversations?offset={offset}&limit={limit}&order=updated"
            )),
            self.request(&format!("/backend-api/conversations?offset={offset}&limit={limit}")),
        ]
    }

    fn detail_variants(&self, id: &str) -> Vec<HttpRequest> {
        vec![
            self.request(&format!("/backend-api/conversation/{id}")),
            self.request(&format!("/backend-api/conversations/{id}")),
        ]
    }

    async fn fetch_detail_api(&self, id: &str) -> Result<ThreadDetail> {
        let raw = self
            .ctx
            .fetch_json(SourcePlatform::ChatGpt, &self.detail_variants(id))
            .await?;
        parse_conversation(id, &raw)
    }
}

#[async_trait]
impl PageSource for ChatGptAdapter {
    async fn fetch_page(&self, token: &PageToken) -> Result<NativePage> {
        let offset = match token {
            PageToken::Start => 0,
            PageToken::Offset(offset) => *offset,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "chatgpt pages by offset, got {other:?}"
                )));
            }
        };
        let limit = self.settings.page_size;
        let raw = self
            .ctx
            .fetch_json(SourcePlatform::ChatGpt, &self.list_variants(offset, limit))
            .await?;

        let items = parse_conversation_list(&raw)?;
        let next_offset = offset + items.len();
        let more = match raw.get("total").and_then(Value::as_u64) {
            Some(total) => (next_offset as u64) < total,
            None => items.len() >= limit,
        };
        Ok(NativePage {
            next: (more && !items.is_empty()).then_some(PageToken::Offset(next_offset)),
            items,
        })
    }
}

#[async_trait]
impl SourceAdapter for ChatGptAdapter {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::ChatGpt
    }

    fn identify(&self, locator: &str) -> Option<String> {
        let segments = locator_segments(locator, HOSTS)?;
        let id = match segments.as_slice() {
            [c, id] if c == "c" => id,
            [g, _, c, id] if g == "g" && c == "c" => id,
            _ => return None,
        };
        is_plausible_id(id).then(|| id.clone())
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

    async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

fn parse_conversation_list(raw: &Value) -> Result<Vec<Thread>> {
    let items = raw
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("conversation list has no items".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            let title = item
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Untitled");
            let last_activity = item
                .get("update_time")
                .and_then(parse_timestamp)
                .or_else(|| item.get("create_time").and_then(parse_timestamp));
            Some(Thread {
                id: id.to_string(),
                title: title.to_string(),
                source: SourcePlatform::ChatGpt,
                last_activity,
            })
        })
        .collect())
}

fn parse_conversation(id: &str, raw: &Value) -> Result<ThreadDetail> {
    let mapping = raw
        .get("mapping")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Validation("conversation has no mapping".to_string()))?;

    let chain = message_chain(mapping, raw.get("current_node").and_then(Value::as_str));
    let messages: Vec<RoleMessage> = chain
        .into_iter()
        .filter_map(|node| node.get("message"))
        .filter(|message| !is_hidden(message))
        .filter_map(RoleMessage::from_json)
        .collect();

    let thread = Thread {
        id: id.to_string(),
        title: raw
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source: SourcePlatform::ChatGpt,
        last_activity: raw.get("update_time").and_then(parse_timestamp),
    };
    // A last turn answered only by a tool (image, code run) keeps its output.
    Ok(ThreadDetail::new(
        thread,
        pair_messages(&messages, TrailingRule::PairWithLastContent),
    ))
}

/// Nodes of the active branch, root first.
///
/// Without a usable `current_node`, every node ordered by creation time.
fn message_chain<'a>(mapping: &'a Map<String, Value>, current: Option<&'a str>) -> Vec<&'a Value> {
    if let Some(mut node_id) = current.filter(|c| mapping.contains_key(*c)) {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(node) = mapping.get(node_id) {
            if !visited.insert(node_id) {
                break;
            }
            chain.push(node);
            match node.get("parent").and_then(Value::as_str) {
                Some(parent) => node_id = parent,
                None => break,
            }
        }
        chain.reverse();
        return chain;
    }

    let created = |node: &Value| {
        node.get("message")
            .and_then(|m| m.get("create_time"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let mut nodes: Vec<&Value> = mapping.values().collect();
    nodes.sort_by(|a, b| created(a).partial_cmp(&created(b)).unwrap_or(Ordering::Equal));
    nodes
}

fn is_hidden(message: &Value) -> bool {
    message
        .get("metadata")
        .and_then(|m| m.get("is_visually_hidden_from_conversation"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
