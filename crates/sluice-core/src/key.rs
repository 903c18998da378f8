//! Canonical source keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: &str = ":///";

/// Deterministic, scheme-qualified identifier of a logical source.
///
/// Rendered as `<scheme>:///<path>`, e.g. `github:///rust-lang/rust` or
/// `text:///md/3f2a9c0d11e4b7a2`. Two inputs naming the same source produce
/// the same key; the key is the cache and deduplication handle in every tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Build a key from a scheme and a path.
    ///
    /// Leading slashes on `path` are ignored so callers may pass either
    /// `owner/repo` or `/owner/repo`.
    pub fn new(scheme: &str, path: impl AsRef<str>) -> Result<Self> {
        let scheme = scheme.trim().to_lowercase();
        let path = path.as_ref().trim().trim_start_matches('/');

        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidKey(format!("bad scheme '{}'", scheme)));
        }
        if path.is_empty() {
            return Err(Error::InvalidKey(format!("empty path for scheme '{}'", scheme)));
        }

        Ok(Self(format!("{}{}{}", scheme, SEPARATOR, path)))
    }

    /// Parse a rendered key, validating its shape.
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, path) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidKey(raw.to_string()))?;
        Self::new(scheme, path)
    }

    /// The scheme component (`github`, `text`, ...).
    pub fn scheme(&self) -> &str {
        self.0
            .split_once(SEPARATOR)
            .map(|(scheme, _)| scheme)
            .unwrap_or_default()
    }

    /// The path component after `:///`.
    pub fn path(&self) -> &str {
        self.0
            .split_once(SEPARATOR)
            .map(|(_, path)| path)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CanonicalKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CanonicalKey> for String {
    fn from(key: CanonicalKey) -> Self {
        key.0
    }
}
