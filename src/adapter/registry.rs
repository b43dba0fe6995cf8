//! Platform → adapter lookup.

use crate::adapter::chatgpt::{ChatGptAdapter, ChatGptSettings};
use crate::adapter::claude::{ClaudeAdapter, ClaudeSettings};
use crate::adapter::perplexity::{PerplexityAdapter, PerplexitySettings};
use crate::adapter::{AdapterContext, SourceAdapter};
use crate::config::{SourceConfig, SourcesConfig};
use crate::error::{Error, Result};
use crate::model::SourcePlatform;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The adapters available to a sync engine, one per platform.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourcePlatform, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for every enabled source.
    #[must_use]
    pub fn from_config(sources: &SourcesConfig, ctx: &AdapterContext) -> Self {
        let mut registry = Self::new();
        for platform in SourcePlatform::ALL {
            let source = sources.get(platform);
            if source.enabled {
                registry.register(build_adapter(platform, source, ctx.clone()));
            }
        }
        registry
    }

    /// Add or replace the adapter for its platform.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the platform has no adapter (disabled).
    pub fn get(&self, platform: SourcePlatform) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters.get(&platform).cloned().ok_or_else(|| {
            Error::Config(format!(
                "source '{platform}' is disabled; enable it under sources.{platform}"
            ))
        })
    }

    /// Registered platforms, in canonical order.
    #[must_use]
    pub fn platforms(&self) -> Vec<SourcePlatform> {
        self.adapters.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// First registered platform that recognises `locator`, with the id.
    #[must_use]
    pub fn identify(&self, locator: &str) -> Option<(SourcePlatform, String)> {
        self.adapters
            .iter()
            .find_map(|(platform, adapter)| adapter.identify(locator).map(|id| (*platform, id)))
    }
}

fn build_adapter(
    platform: SourcePlatform,
    source: &SourceConfig,
    ctx: AdapterContext,
) -> Arc<dyn SourceAdapter> {
    match platform {
        SourcePlatform::ChatGpt => {
            let defaults = ChatGptSettings::default();
            Arc::new(ChatGptAdapter::new(
                ctx,
                ChatGptSettings {
                    base_url: source.base_url.clone().unwrap_or(defaults.base_url),
                    access_token: source.token.clone(),
                    page_size: source.page_size.unwrap_or(defaults.page_size),
                },
            ))
        }
        SourcePlatform::Claude => {
            let defaults = ClaudeSettings::default();
            Arc::new(ClaudeAdapter::new(
                ctx,
                ClaudeSettings {
                    base_url: source.base_url.clone().unwrap_or(defaults.base_url),
                    organization_id: source.organization_id.clone(),
                    session_cookie: source.cookie.clone(),
                },
            ))
        }
        SourcePlatform::Perplexity => {
            let defaults = PerplexitySettings::default();
            Arc::new(PerplexityAdapter::new(
                ctx,
                PerplexitySettings {
                    base_url: source.base_url.clone().unwrap_or(defaults.base_url),
                    session_cookie: source.cookie.clone(),
                    page_size: source.page_size.unwrap_or(defaults.page_size),
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http::MockTransport;

    fn ctx() -> AdapterContext {
        AdapterContext::new(
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::at_epoch(0)),
        )
    }

    #[test]
    fn test_identify_across_sources() {
        let registry = AdapterRegistry::from_config(&SourcesConfig::default(), &ctx());
        assert_eq!(registry.platforms().len(), 3);
        assert_eq!(
            registry.identify("https://claude.ai/chat/abc-123"),
            Some((SourcePlatform::Claude, "abc-123".to_string()))
        );
        assert_eq!(
            registry.identify("https://www.perplexity.ai/search/slug-1"),
            Some((SourcePlatform::Perplexity, "slug-1".to_string()))
        );
        assert_eq!(registry.identify("https://example.com/c/abc"), None);
    }

    #[test]
    fn test_disabled_source_is_config_error() {
        let mut sources = SourcesConfig::default();
        sources.perplexity.enabled = false;
        let registry = AdapterRegistry::from_config(&sources, &ctx());

        assert!(registry.get(SourcePlatform::ChatGpt).is_ok());
        let err = registry.get(SourcePlatform::Perplexity).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            registry.identify("https://www.perplexity.ai/search/slug-1"),
            None
        );
    }
}
