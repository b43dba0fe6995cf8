//! Liveness check for the extraction context.

use crate::clock::Clock;
use crate::dom::ActiveDocument;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Answer to a `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Report whether the extraction context can be addressed.
///
/// Healthy when no document is attached, or when the attached document
/// yields a snapshot.
pub fn ping(clock: &dyn Clock, document: Option<&dyn ActiveDocument>) -> HealthStatus {
    let timestamp = clock.now();
    match document.map(|d| d.snapshot()) {
        None | Some(Ok(_)) => HealthStatus {
            healthy: true,
            timestamp,
            detail: None,
        },
        Some(Err(e)) => HealthStatus {
            healthy: false,
            timestamp,
            detail: Some(e.to_string()),
        },
    }
}
