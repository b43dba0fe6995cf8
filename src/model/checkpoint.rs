//! Per-source sync watermark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-water mark for incremental sync of one source.
///
/// `last_sync_time` never moves backwards; only an explicit reset clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_seen_id: Option<String>,
}

impl Checkpoint {
    /// Move the watermark forward.
    ///
    /// A `time` older than the current watermark leaves the time unchanged;
    /// `last_seen_id` is updated whenever one is given.
    pub fn advance(&mut self, time: DateTime<Utc>, last_seen_id: Option<String>) {
        if self.last_sync_time.is_none_or(|current| time > current) {
            self.last_sync_time = Some(time);
        }
        if last_seen_id.is_some() {
            self.last_seen_id = last_seen_id;
        }
    }

    /// Whether an item with this activity time is newer than the watermark.
    ///
    /// Items without an activity time are always considered new; the
    /// exported-id set catches repeats.
    #[must_use]
    pub fn is_newer(&self, activity: Option<DateTime<Utc>>) -> bool {
        match (self.last_sync_time, activity) {
            (Some(cp), Some(at)) => at > cp,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut cp = Checkpoint::default();
        cp.advance(at(100), Some("a".into()));
        cp.advance(at(50), Some("b".into()));
        assert_eq!(cp.last_sync_time, Some(at(100)));
        assert_eq!(cp.last_seen_id.as_deref(), Some("b"));

        cp.advance(at(200), None);
        assert_eq!(cp.last_sync_time, Some(at(200)));
        assert_eq!(cp.last_seen_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_is_newer() {
        let cp = Checkpoint {
            last_sync_time: Some(at(15)),
            last_seen_id: None,
        };
        assert!(!cp.is_newer(Some(at(10))));
        assert!(!cp.is_newer(Some(at(15))));
        assert!(cp.is_newer(Some(at(20))));
        assert!(cp.is_newer(None));
        assert!(Checkpoint::default().is_newer(Some(at(0))));
    }
}
