//! arXiv paper parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;

/// Parser for arXiv identifiers and `arxiv.org/abs|pdf` URLs.
///
/// Versions (`v2`) are dropped: all revisions of a paper share a key.
pub struct ArxivParser;

/// Strip a version suffix and validate `NNNN.NNNN[N]`.
fn paper_id(raw: &str) -> Option<String> {
    let raw = raw.strip_suffix(".pdf").unwrap_or(raw);
    let base = match raw.rfind('v') {
        Some(pos) if pos + 1 < raw.len() && raw[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &raw[..pos]
        }
        _ => raw,
    };

    let (year_month, number) = base.split_once('.')?;
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if year_month.len() == 4 && digits(year_month) && (4..=5).contains(&number.len()) && digits(number)
    {
        Some(base.to_string())
    } else {
        None
    }
}

fn from_locator(locator: &str) -> Option<String> {
    let bare = locator.strip_prefix("arXiv:").unwrap_or(locator);
    if let Some(id) = paper_id(bare) {
        return Some(id);
    }

    let url = web_url(locator)?;
    if !url.host_str()?.ends_with("arxiv.org") {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    match segments.next()? {
        "abs" | "pdf" => paper_id(segments.next()?),
        _ => None,
    }
}

impl Parser for ArxivParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .is_some_and(|locator| from_locator(locator).is_some())
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let id = from_locator(locator)
            .ok_or_else(|| IdentityError::malformed(self.scheme(), locator, "no paper id"))?;
        locator_identity(self.kind(), &id, locator)
    }
}
