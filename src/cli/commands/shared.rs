//! Shared wiring for commands: config, store, transport, adapters, engine.

use crate::adapter::{AdapterContext, AdapterRegistry};
use crate::cli::DocumentArgs;
use crate::cli::commands::Paths;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{Config, NotionConfig, resolve_db_path};
use crate::dispatch::{DispatchQueue, RetryPolicy};
use crate::dom::{ActiveDocument, HtmlSnapshot};
use crate::error::{Error, Result};
use crate::export::{Exporter, NotionClient, PageParent, PageWriter};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::model::SourcePlatform;
use crate::storage::{SharedStore, SqliteStore};
use crate::sync::SyncEngine;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create runtime: {e}")))
}

pub(crate) fn parse_source(source: &str) -> Result<SourcePlatform> {
    source.parse()
}

pub(crate) fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

pub(crate) fn open_store(paths: &Paths<'_>) -> Result<SharedStore> {
    let db_path = resolve_db_path(paths.db)
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
    Ok(Arc::new(SqliteStore::open(&db_path)?))
}

pub(crate) fn load_document(args: &DocumentArgs) -> Result<Option<Arc<dyn ActiveDocument>>> {
    match (&args.snapshot, &args.locator) {
        (Some(path), Some(locator)) => {
            let snapshot = HtmlSnapshot::load(locator.clone(), path)?;
            Ok(Some(Arc::new(snapshot)))
        }
        _ => Ok(None),
    }
}

/// Everything a command needs to talk to the sources.
pub(crate) struct SourceWiring {
    pub config: Config,
    pub transport: Arc<dyn HttpTransport>,
    pub clock: SharedClock,
    pub registry: AdapterRegistry,
}

impl SourceWiring {
    pub(crate) fn load(paths: &Paths<'_>, document: &DocumentArgs) -> Result<Self> {
        let config = Config::load(paths.config)?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_timeout(
            Duration::from_secs(config.http.timeout_secs),
            &config.http.user_agent,
        )?);
        let clock = system_clock();

        let mut ctx = AdapterContext::new(Arc::clone(&transport), Arc::clone(&clock));
        if let Some(doc) = load_document(document)? {
            ctx = ctx.with_document(doc);
        }
        let registry = AdapterRegistry::from_config(&config.sources, &ctx);

        Ok(Self {
            config,
            transport,
            clock,
            registry,
        })
    }

    /// Start the dispatch worker and assemble a sync engine.
    ///
    /// Must be called inside the tokio runtime.
    pub(crate) fn engine(&self, store: SharedStore) -> Result<SyncEngine> {
        let notion = &self.config.notion;
        let token = notion.token.clone().ok_or_else(|| {
            Error::Config(
                "No export token: set notion.token or THREADSYNC_NOTION_TOKEN".to_string(),
            )
        })?;
        let parent = export_parent(notion)?;

        let writer: Arc<dyn PageWriter> = Arc::new(NotionClient::new(
            Arc::clone(&self.transport),
            notion.base_url.clone(),
            token,
            notion.api_version.clone(),
        ));
        let queue = DispatchQueue::spawn(
            writer,
            Arc::clone(&self.clock),
            Arc::clone(&store),
            self.config.dispatch.clone(),
            RetryPolicy::default(),
        );
        let exporter = Exporter::new(Arc::new(queue), parent);

        Ok(SyncEngine::new(
            self.registry.clone(),
            exporter,
            store,
            Arc::clone(&self.clock),
            self.config.sync.clone(),
        ))
    }
}

/// Database target wins over a parent page.
pub(crate) fn export_parent(notion: &NotionConfig) -> Result<PageParent> {
    if let Some(id) = notion.database_id.as_ref().filter(|s| !s.trim().is_empty()) {
        return Ok(PageParent::Database(id.clone()));
    }
    if let Some(id) = notion.parent_page_id.as_ref().filter(|s| !s.trim().is_empty()) {
        return Ok(PageParent::Page(id.clone()));
    }
    Err(Error::Config(
        "No export target: set notion.parent_page_id (or THREADSYNC_NOTION_PARENT) or notion.database_id"
            .to_string(),
    ))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
