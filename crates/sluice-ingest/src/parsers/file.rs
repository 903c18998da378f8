//! Local file and in-memory payload parser.

use super::Parser;
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{extension_of, fingerprint, fingerprint_file, RawInput, SourceIdentity};
use sluice_core::{CanonicalKey, SourceKind};
use std::path::{Path, PathBuf};

/// Parser for content identified by its bytes.
///
/// Keys are `<kind>:///<ext>/<fingerprint>`: renaming or moving a file keeps
/// its key, editing it produces a new one.
pub struct FileParser;

/// Resolve a locator to a local path, accepting `file://` URLs.
pub(crate) fn local_path(locator: &str) -> Option<PathBuf> {
    let raw = locator.strip_prefix("file://").unwrap_or(locator);
    if raw.is_empty() || raw.contains("://") {
        return None;
    }
    let path = Path::new(raw);
    path.is_file().then(|| path.to_path_buf())
}

fn kind_of(name: &str) -> Option<(SourceKind, String)> {
    let ext = extension_of(name)?;
    SourceKind::from_extension(&ext).map(|kind| (kind, ext))
}

fn content_identity(
    kind: SourceKind,
    ext: &str,
    fingerprint: String,
    original: &str,
) -> IdentityResult<SourceIdentity> {
    let key = CanonicalKey::new(kind.scheme(), format!("{}/{}", ext, fingerprint))
        .map_err(|e| IdentityError::malformed(kind.scheme(), original, e))?;
    Ok(SourceIdentity::new(kind, key, original).with_fingerprint(fingerprint))
}

impl Parser for FileParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Text
    }

    fn scheme(&self) -> &'static str {
        "file"
    }

    fn identify(&self, input: &RawInput) -> bool {
        match input {
            RawInput::Payload { name, .. } => kind_of(name).is_some(),
            RawInput::Locator(raw) => local_path(raw.trim())
                .is_some_and(|path| kind_of(&path.to_string_lossy()).is_some()),
        }
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        match input {
            RawInput::Payload { name, bytes } => {
                let (kind, ext) = kind_of(name).ok_or_else(|| {
                    IdentityError::malformed(self.scheme(), name, "unsupported file type")
                })?;
                Ok(content_identity(kind, &ext, fingerprint(bytes), name)?
                    .with_payload(bytes.clone()))
            }
            RawInput::Locator(raw) => {
                let locator = raw.trim();
                let path = local_path(locator).ok_or_else(|| IdentityError::Unreadable {
                    path: locator.to_string(),
                    reason: "not a readable file".to_string(),
                })?;
                let (kind, ext) = kind_of(&path.to_string_lossy()).ok_or_else(|| {
                    IdentityError::malformed(self.scheme(), locator, "unsupported file type")
                })?;
                let fingerprint = fingerprint_file(&path)?;
                Ok(content_identity(kind, &ext, fingerprint, locator)?.with_path(path))
            }
        }
    }
}
