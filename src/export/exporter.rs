//! Page export through the dispatch queue.

use crate::dispatch::{DispatchQueue, WriteOp, WriteOutcome};
use crate::error::{Error, Result};
use crate::export::{PageParent, PageRef, render_page};
use crate::model::ThreadDetail;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Most children the write API accepts in one call.
pub const MAX_CHILDREN_PER_CALL: usize = 100;

/// Split children into the batch sent with page creation and the batches
/// appended afterwards, each at most [`MAX_CHILDREN_PER_CALL`] long.
#[must_use]
pub fn split_children(mut children: Vec<Value>) -> (Vec<Value>, Vec<Vec<Value>>) {
    let rest = if children.len() > MAX_CHILDREN_PER_CALL {
        children.split_off(MAX_CHILDREN_PER_CALL)
    } else {
        Vec::new()
    };
    let appends = rest
        .chunks(MAX_CHILDREN_PER_CALL)
        .map(<[Value]>::to_vec)
        .collect();
    (children, appends)
}

/// What one export did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub page: PageRef,
    /// Write calls made: one create plus the appends.
    pub calls: usize,
    pub blocks: usize,
}

/// Writes thread details as pages under one parent.
#[derive(Clone)]
pub struct Exporter {
    queue: Arc<DispatchQueue>,
    parent: PageParent,
}

impl Exporter {
    #[must_use]
    pub fn new(queue: Arc<DispatchQueue>, parent: PageParent) -> Self {
        Self { queue, parent }
    }

    /// Create a page for `detail`, appending whatever does not fit the
    /// creation call.
    ///
    /// # Errors
    ///
    /// The first failing write. After a failed append the created page is
    /// archived; the error names it.
    pub async fn export(&self, detail: &ThreadDetail) -> Result<ExportReceipt> {
        let mut request = render_page(&self.parent, detail);
        let blocks = request.children.len();
        let (first, appends) = split_children(std::mem::take(&mut request.children));
        request.children = first;

        let page = match self.queue.enqueue(WriteOp::CreatePage(request)).await? {
            WriteOutcome::Created(page) => page,
            other => {
                return Err(Error::Other(format!(
                    "unexpected dispatch outcome for page creation: {other:?}"
                )));
            }
        };
        debug!(page = %page.id, blocks, appends = appends.len(), "page created");

        let calls = 1 + appends.len();
        for children in appends {
            let appended = self
                .queue
                .enqueue(WriteOp::AppendChildren {
                    page_id: page.id.clone(),
                    children,
                })
                .await;
            if let Err(e) = appended {
                warn!(page = %page.id, error = %e, "append failed after page creation");
                return Err(self.discard_incomplete(&page.id, &e).await);
            }
        }

        Ok(ExportReceipt {
            page,
            calls,
            blocks,
        })
    }

    /// Writes waiting in the dispatch queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Archive a page whose appends failed; a retry writes it whole.
    async fn discard_incomplete(&self, page_id: &str, cause: &Error) -> Error {
        match self.archive(page_id).await {
            Ok(()) => Error::Other(format!(
                "export failed and partial page {page_id} was archived: {}",
                cause.reason()
            )),
            Err(e) => {
                warn!(page = %page_id, error = %e, "could not archive partial page");
                Error::Other(format!(
                    "page {page_id} is incomplete and could not be archived: {}",
                    cause.reason()
                ))
            }
        }
    }

    /// Move a previously exported page to the trash.
    ///
    /// # Errors
    ///
    /// The write error.
    pub async fn archive(&self, page_id: &str) -> Result<()> {
        self.queue
            .enqueue(WriteOp::ArchivePage {
                page_id: page_id.to_string(),
            })
            .await
            .map(|_| ())
    }
}
