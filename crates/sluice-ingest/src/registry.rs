//! Priority-ordered strategy registry.

use crate::error::{IdentityError, IdentityResult};
use crate::identity::{RawInput, SourceIdentity};
use crate::parsers::builtin_parsers;
use crate::strategy::{Enricher, Extractor, StrategyTriple};
use sluice_core::CanonicalKey;
use std::sync::Arc;

/// Resolves inputs to strategy triples. Immutable once built.
///
/// Parsers are consulted in registration order and the first one that
/// identifies the input wins.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: Vec<StrategyTriple>,
}

/// Builder for [`StrategyRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    strategies: Vec<StrategyTriple>,
}

impl RegistryBuilder {
    /// Append a strategy. Earlier registrations take priority.
    pub fn register(mut self, triple: StrategyTriple) -> Self {
        self.strategies.push(triple);
        self
    }

    /// Append every built-in parser, each paired with the same collaborators.
    pub fn register_builtin(
        mut self,
        extractor: Arc<dyn Extractor>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        for parser in builtin_parsers() {
            self.strategies.push(StrategyTriple::new(
                parser,
                extractor.clone(),
                enricher.clone(),
            ));
        }
        self
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            strategies: self.strategies,
        }
    }
}

impl StrategyRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The first strategy whose parser identifies `input`.
    pub fn resolve(&self, input: &RawInput) -> IdentityResult<&StrategyTriple> {
        self.strategies
            .iter()
            .find(|triple| triple.parser.identify(input))
            .ok_or_else(|| IdentityError::NoMatchingScheme(input.to_string()))
    }

    /// Resolve and canonicalize in one step.
    pub fn resolve_with_identity(
        &self,
        input: &RawInput,
    ) -> IdentityResult<(&StrategyTriple, SourceIdentity)> {
        let triple = self.resolve(input)?;
        let identity = triple.parser.canonicalize(input)?;
        Ok((triple, identity))
    }

    /// The canonical key of `input`.
    pub fn canonicalize(&self, input: &RawInput) -> IdentityResult<CanonicalKey> {
        self.resolve_with_identity(input)
            .map(|(_, identity)| identity.key)
    }

    /// Registered schemes in priority order.
    pub fn schemes(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|t| t.scheme()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::ExcerptEnricher;
    use crate::extract::LocalTextExtractor;
    use crate::parsers::{ArticleParser, GitHubParser};

    fn builtin() -> StrategyRegistry {
        StrategyRegistry::builder()
            .register_builtin(Arc::new(LocalTextExtractor::new()), Arc::new(ExcerptEnricher::new()))
            .build()
    }

    #[test]
    fn test_builtin_schemes_in_priority_order() {
        let registry = builtin();
        assert_eq!(
            registry.schemes(),
            vec!["github", "youtube", "arxiv", "email", "drive", "obsidian", "file", "article"]
        );
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_resolve_picks_most_specific() {
        let registry = builtin();
        let cases = [
            ("https://github.com/serde-rs/serde", "github"),
            ("https://youtu.be/dQw4w9WgXcQ", "youtube"),
            ("2301.07041", "arxiv"),
            ("https://docs.google.com/document/d/abc/edit", "drive"),
            ("https://example.com/post", "article"),
        ];
        for (input, scheme) in cases {
            assert_eq!(registry.resolve(&RawInput::from(input)).unwrap().scheme(), scheme);
        }
    }

    #[test]
    fn test_unkeyable_pages_fall_through_to_article() {
        let registry = builtin();
        for input in [
            "https://github.com/rust-lang",
            "https://www.youtube.com/@rustlang",
            "https://arxiv.org/list/cs.AI/recent",
            "https://docs.google.com/forms",
            "https://mail.google.com/mail/u/0/#inbox",
        ] {
            let strategy = registry.resolve(&RawInput::from(input)).unwrap();
            assert_eq!(strategy.scheme(), "article", "{}", input);
            let key = registry.canonicalize(&RawInput::from(input)).unwrap();
            assert_eq!(key.scheme(), "article", "{}", input);
        }
    }

    #[test]
    fn test_registration_order_decides() {
        let extractor: Arc<dyn Extractor> = Arc::new(LocalTextExtractor::new());
        let enricher: Arc<dyn Enricher> = Arc::new(ExcerptEnricher::new());
        let registry = StrategyRegistry::builder()
            .register(StrategyTriple::new(
                Arc::new(ArticleParser),
                extractor.clone(),
                enricher.clone(),
            ))
            .register(StrategyTriple::new(Arc::new(GitHubParser), extractor, enricher))
            .build();

        let key = registry
            .canonicalize(&RawInput::from("https://github.com/serde-rs/serde"))
            .unwrap();
        assert_eq!(key.as_str(), "article:///github.com/serde-rs/serde");
    }

    #[test]
    fn test_no_matching_scheme() {
        let registry = builtin();
        for input in ["plain words", "example.com/no-scheme", "/no/such/file.md"] {
            let err = registry.canonicalize(&RawInput::from(input)).unwrap_err();
            assert!(matches!(err, IdentityError::NoMatchingScheme(_)), "{}", input);
        }
        assert!(StrategyRegistry::default().is_empty());
    }
}
