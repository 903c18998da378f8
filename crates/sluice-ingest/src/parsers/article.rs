//! Generic web article parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::IdentityResult;
use crate::identity::{normalize_url, url_key_path, web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;

/// Catch-all for http(s) URLs no specific parser claimed.
///
/// Requires an explicit scheme so bare words and file names never turn
/// into web requests.
pub struct ArticleParser;

fn has_web_scheme(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl Parser for ArticleParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Article
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .is_some_and(|locator| has_web_scheme(locator) && web_url(locator).is_some())
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let url = normalize_url(locator)?;
        locator_identity(self.kind(), &url_key_path(&url), locator)
    }
}
