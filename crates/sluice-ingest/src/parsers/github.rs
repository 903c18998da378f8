//! GitHub repository parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;

/// Parser for `github.com/<owner>/<repo>` URLs.
///
/// Anything after the repository segment (`tree/main/src`, `blob/...`,
/// `issues`) is noise; every page of a repository keys to the repository.
pub struct GitHubParser;

impl GitHubParser {
    fn owner_repo(locator: &str) -> Option<(String, String)> {
        let url = web_url(locator)?;
        if url.host_str()? != "github.com" {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?.to_lowercase();
        let repo = segments.next()?.to_lowercase();
        let repo = repo.strip_suffix(".git").unwrap_or(&repo).to_string();
        if repo.is_empty() {
            return None;
        }
        Some((owner, repo))
    }
}

impl Parser for GitHubParser {
    fn kind(&self) -> SourceKind {
        SourceKind::GitHub
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .is_some_and(|locator| Self::owner_repo(locator).is_some())
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let (owner, repo) = Self::owner_repo(locator).ok_or_else(|| {
            IdentityError::malformed(self.scheme(), locator, "expected github.com/<owner>/<repo>")
        })?;
        locator_identity(self.kind(), &format!("{}/{}", owner, repo), locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(input: &str) -> String {
        GitHubParser
            .canonicalize(&RawInput::from(input))
            .unwrap()
            .key
            .to_string()
    }

    #[test]
    fn test_repo_pages_collapse() {
        let expected = "github:///rust-lang/rust";
        assert_eq!(key("https://github.com/rust-lang/rust"), expected);
        assert_eq!(key("https://github.com/Rust-Lang/Rust.git"), expected);
        assert_eq!(key("github.com/rust-lang/rust/tree/master/library"), expected);
        assert_eq!(key("https://www.github.com/rust-lang/rust/blob/master/README.md#L3"), expected);
        assert_eq!(key("https://github.com/rust-lang/rust/?utm_source=feed"), expected);
    }

    #[test]
    fn test_identify() {
        assert!(GitHubParser.identify(&RawInput::from("https://github.com/tokio-rs/tokio")));
        assert!(!GitHubParser.identify(&RawInput::from("https://gitlab.com/a/b")));
        assert!(!GitHubParser.identify(&RawInput::from("https://github.com/rust-lang")));
        assert!(!GitHubParser.identify(&RawInput::payload("a.md", b"x".to_vec())));
    }

    #[test]
    fn test_owner_only_is_malformed() {
        let err = GitHubParser
            .canonicalize(&RawInput::from("https://github.com/rust-lang"))
            .unwrap_err();
        assert!(matches!(err, IdentityError::Malformed { scheme: "github", .. }));
    }
}
