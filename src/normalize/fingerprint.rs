//! Change-detection fingerprints.
//!
//! A fingerprint digests the identity-relevant parts of a detail (id, title,
//! entry count, first and last query). It is a 32-bit string hash: a
//! collision reads as "unchanged", which only ever skips a re-export.

use crate::model::ThreadDetail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hex digest of a detail's content keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a detail.
///
/// Keys are serialized in sorted order so the digest does not depend on
/// how the detail was assembled.
#[must_use]
pub fn fingerprint(detail: &ThreadDetail) -> Fingerprint {
    let first_query = detail.entries.first().map_or("", |e| e.query.trim());
    let last_query = detail.entries.last().map_or("", |e| e.query.trim());

    let mut keys: BTreeMap<&str, String> = BTreeMap::new();
    keys.insert("id", detail.thread.id.clone());
    keys.insert("title", detail.thread.title.trim().to_string());
    keys.insert("entry_count", detail.entries.len().to_string());
    keys.insert("first_query", first_query.to_string());
    keys.insert("last_query", last_query.to_string());

    let canonical = keys
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\u{1f}");

    Fingerprint(format!("{:08x}", string_hash(&canonical)))
}

/// `h = h * 31 + c` over UTF-16 code units, wrapping at 32 bits.
fn string_hash(input: &str) -> u32 {
    input.encode_utf16().fold(0u32, |h, unit| {
        (h << 5).wrapping_sub(h).wrapping_add(u32::from(unit))
    })
}

/// Whether `current` matches the stored fingerprint.
///
/// No stored fingerprint means the detail was never exported.
#[must_use]
pub fn is_unchanged(current: &Fingerprint, stored: Option<&Fingerprint>) -> bool {
    stored.is_some_and(|s| s == current)
}
