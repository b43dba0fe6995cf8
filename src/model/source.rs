//! Source platform identity.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A chat platform threads are harvested from.
///
/// Thread identity is `(SourcePlatform, id)`; ids are never compared across
/// platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePlatform {
    ChatGpt,
    Claude,
    Perplexity,
}

impl SourcePlatform {
    pub const ALL: [SourcePlatform; 3] = [Self::ChatGpt, Self::Claude, Self::Perplexity];

    /// Stable lowercase key used in store keys and CLI arguments.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Perplexity => "perplexity",
        }
    }

    /// Human-readable name used in exported pages.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Perplexity => "Perplexity",
        }
    }
}

impl SourcePlatform {
    /// Web URL of a thread on this platform.
    #[must_use]
    pub fn thread_url(self, id: &str) -> String {
        match self {
            Self::ChatGpt => format!("https://chatgpt.com/c/{id}"),
            Self::Claude => format!("https://claude.ai/chat/{id}"),
            Self::Perplexity => format!("https://www.perplexity.ai/search/{id}"),
        }
    }
}

impl fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcePlatform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(Self::ChatGpt),
            "claude" | "anthropic" => Ok(Self::Claude),
            "perplexity" | "pplx" => Ok(Self::Perplexity),
            other => Err(Error::UnknownSource(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        for platform in SourcePlatform::ALL {
            assert_eq!(platform.as_str().parse::<SourcePlatform>().unwrap(), platform);
        }
        assert_eq!("PPLX".parse::<SourcePlatform>().unwrap(), SourcePlatform::Perplexity);
    }

    #[test]
    fn test_unknown_source_is_error() {
        let err = "gemini".parse::<SourcePlatform>().unwrap_err();
        assert!(matches!(err, Error::UnknownSource(s) if s == "gemini"));
    }
}
