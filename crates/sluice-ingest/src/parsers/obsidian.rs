//! Obsidian vault note parser.

use super::file::local_path;
use super::Parser;
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{fingerprint, RawInput, SourceIdentity};
use sluice_core::{CanonicalKey, SourceKind};
use std::path::{Path, PathBuf};

const VAULT_MARKER: &str = ".obsidian";

/// Parser for markdown notes living inside an Obsidian vault.
///
/// Notes are keyed by location, not content: a note is a living document
/// and edits update the same record.
pub struct ObsidianParser;

fn vault_note(path: &Path) -> bool {
    let is_markdown = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"));
    is_markdown && path.ancestors().skip(1).any(|dir| dir.join(VAULT_MARKER).is_dir())
}

fn note_path(input: &RawInput) -> Option<PathBuf> {
    let path = local_path(input.as_locator()?)?;
    let canonical = path.canonicalize().ok()?;
    vault_note(&canonical).then_some(canonical)
}

impl Parser for ObsidianParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Obsidian
    }

    fn identify(&self, input: &RawInput) -> bool {
        note_path(input).is_some()
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let original = input.to_string();
        let path = note_path(input).ok_or_else(|| {
            IdentityError::malformed(self.scheme(), &original, "not a note inside a vault")
        })?;
        let fingerprint = fingerprint(path.to_string_lossy().as_bytes());
        let key = CanonicalKey::new(self.scheme(), &fingerprint)
            .map_err(|e| IdentityError::malformed(self.scheme(), &original, e))?;

        Ok(SourceIdentity::new(self.kind(), key, original)
            .with_fingerprint(fingerprint)
            .with_path(path))
    }
}
