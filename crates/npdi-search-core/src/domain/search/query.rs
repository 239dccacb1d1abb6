//! Query normalization
//!
//! Raw search-bar input is canonicalized once; the resulting key is the only
//! identity used for caching, duplicate collapsing and supersession.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonicalized query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NormalizedQuery {
    key: String,
    display: String,
}

impl NormalizedQuery {
    /// The empty sentinel
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cache and dedup identity: trimmed, whitespace-collapsed, lower-cased
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whitespace-collapsed input with its original casing
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Terms of the key, for adapters that match on tokens
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.key.split(' ').filter(|t| !t.is_empty())
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Canonicalize raw input.
///
/// Whitespace runs (any Unicode whitespace) collapse to a single space, leading
/// and trailing whitespace is dropped and the key is lower-cased. Input that is
/// empty after trimming yields the empty sentinel.
pub fn normalize(raw: &str) -> NormalizedQuery {
    let display = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if display.is_empty() {
        return NormalizedQuery::empty();
    }

    // Lower-casing can introduce whitespace in exotic scripts; collapse again.
    let key = display
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    NormalizedQuery { key, display }
}
