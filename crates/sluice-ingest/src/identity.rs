//! Source identity: raw inputs, fingerprints and URL normalisation.

use crate::error::{IdentityError, IdentityResult};
use sha2::{Digest, Sha256};
use sluice_core::{CanonicalKey, SourceKind};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Hex characters kept from a SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Query parameters that never change what a URL points at.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src", "si", "feature",
    "spm", "_hsenc", "_hsmi",
];

/// Input handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    /// A URL, external identifier or local path.
    Locator(String),
    /// Content already in memory. `name` supplies the file extension.
    Payload { name: String, bytes: Arc<[u8]> },
}

impl RawInput {
    pub fn locator(value: impl Into<String>) -> Self {
        RawInput::Locator(value.into())
    }

    pub fn payload(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawInput::Payload {
            name: name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// The locator string, trimmed, if this is a locator.
    pub fn as_locator(&self) -> Option<&str> {
        match self {
            RawInput::Locator(value) => Some(value.trim()),
            RawInput::Payload { .. } => None,
        }
    }
}

impl fmt::Display for RawInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawInput::Locator(value) => f.write_str(value.trim()),
            RawInput::Payload { name, bytes } => write!(f, "{} ({} bytes)", name, bytes.len()),
        }
    }
}

impl From<&str> for RawInput {
    fn from(value: &str) -> Self {
        RawInput::locator(value)
    }
}

impl From<String> for RawInput {
    fn from(value: String) -> Self {
        RawInput::Locator(value)
    }
}

/// A resolved source: what it is and how it is keyed.
#[derive(Debug, Clone)]
pub struct SourceIdentity {
    pub kind: SourceKind,
    pub key: CanonicalKey,
    /// The input as the caller supplied it.
    pub original: String,
    pub fingerprint: String,
    /// Local file backing the source, if any.
    pub path: Option<PathBuf>,
    /// In-memory content, for payload inputs.
    pub payload: Option<Arc<[u8]>>,
}

impl SourceIdentity {
    pub fn new(kind: SourceKind, key: CanonicalKey, original: impl Into<String>) -> Self {
        let fingerprint = fingerprint(key.as_str().as_bytes());
        Self {
            kind,
            key,
            original: original.into(),
            fingerprint,
            path: None,
            payload: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_payload(mut self, payload: Arc<[u8]>) -> Self {
        self.payload = Some(payload);
        self
    }
}

fn truncate(digest: &[u8]) -> String {
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// SHA-256 of `bytes`, hex, truncated to [`FINGERPRINT_LEN`].
pub fn fingerprint(bytes: &[u8]) -> String {
    truncate(&Sha256::digest(bytes))
}

/// Streaming variant of [`fingerprint`].
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(truncate(&hasher.finalize()))
}

/// Fingerprint a file's content.
pub fn fingerprint_file(path: &Path) -> IdentityResult<String> {
    let file = std::fs::File::open(path).map_err(|e| IdentityError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    fingerprint_reader(std::io::BufReader::new(file)).map_err(|e| IdentityError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Lowercased extension of a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Parse a web locator leniently.
///
/// Accepts a missing `https://` when the input starts with a dotted host.
/// The host comes back IDNA-encoded and lower-cased, with `www.` and `m.`
/// mirror prefixes removed. Path, query and fragment are untouched.
pub fn web_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        let host = trimmed.split('/').next().unwrap_or_default();
        if !host.contains('.') || trimmed.starts_with('.') {
            return None;
        }
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_lowercase();
    let stripped = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();
    if stripped != host {
        url.set_host(Some(&stripped)).ok()?;
    }

    Some(url)
}

/// Normalise a web URL so equivalent locators compare equal.
///
/// On top of [`web_url`]: the fragment and trailing slash are dropped,
/// tracking parameters are removed and the remaining parameters sorted.
pub fn normalize_url(raw: &str) -> IdentityResult<Url> {
    let mut url = web_url(raw).ok_or_else(|| IdentityError::malformed("url", raw, "not an http(s) URL"))?;

    url.set_fragment(None);

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    kept.sort();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    Ok(url)
}

/// The keyed form of a normalised URL: host, optional port, path and query.
pub fn url_key_path(url: &Url) -> String {
    let mut out = url.host_str().unwrap_or_default().to_string();
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}
