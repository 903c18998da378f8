//! Scheme parsers: recognise an input and build its canonical key.

mod arxiv;
mod article;
mod drive;
mod email;
mod file;
mod github;
mod obsidian;
mod youtube;

pub use arxiv::ArxivParser;
pub use article::ArticleParser;
pub use drive::DriveParser;
pub use email::EmailParser;
pub use file::FileParser;
pub use github::GitHubParser;
pub use obsidian::ObsidianParser;
pub use youtube::YouTubeParser;

use crate::error::{IdentityError, IdentityResult};
use crate::identity::{RawInput, SourceIdentity};
use sluice_core::{CanonicalKey, SourceKind};
use std::sync::Arc;

/// Trait for scheme parsers.
///
/// `identify` must be cheap and side-effect free; it runs for every
/// registered scheme until one accepts the input.
pub trait Parser: Send + Sync {
    /// Source kind produced by this parser.
    fn kind(&self) -> SourceKind;

    /// Key scheme owned by this parser.
    fn scheme(&self) -> &'static str {
        self.kind().scheme()
    }

    /// Whether this parser claims the input.
    fn identify(&self, input: &RawInput) -> bool;

    /// Build the canonical identity of a claimed input.
    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity>;
}

/// The built-in parsers, most specific first.
pub fn builtin_parsers() -> Vec<Arc<dyn Parser>> {
    vec![
        Arc::new(GitHubParser),
        Arc::new(YouTubeParser),
        Arc::new(ArxivParser),
        Arc::new(EmailParser),
        Arc::new(DriveParser),
        Arc::new(ObsidianParser),
        Arc::new(FileParser),
        Arc::new(ArticleParser),
    ]
}

/// Build a locator-keyed identity.
pub(crate) fn locator_identity(
    kind: SourceKind,
    path: &str,
    original: &str,
) -> IdentityResult<SourceIdentity> {
    let key = CanonicalKey::new(kind.scheme(), path)
        .map_err(|e| IdentityError::malformed(kind.scheme(), original, e))?;
    Ok(SourceIdentity::new(kind, key, original))
}

/// The locator of an input, or a malformed error for payloads.
pub(crate) fn require_locator<'a>(
    scheme: &'static str,
    input: &'a RawInput,
) -> IdentityResult<&'a str> {
    input
        .as_locator()
        .ok_or_else(|| IdentityError::malformed(scheme, &input.to_string(), "expected a locator"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_puts_article_last() {
        let parsers = builtin_parsers();
        assert_eq!(parsers.first().unwrap().scheme(), "github");
        assert_eq!(parsers.last().unwrap().scheme(), "article");
    }

    #[test]
    fn test_exactly_first_match_wins() {
        let parsers = builtin_parsers();
        let input = RawInput::from("https://github.com/rust-lang/rust");
        let claimed: Vec<_> = parsers
            .iter()
            .filter(|p| p.identify(&input))
            .map(|p| p.scheme())
            .collect();
        // The generic article parser also accepts it; order decides
        assert_eq!(claimed, vec!["github", "article"]);
    }
}
