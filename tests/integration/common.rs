//! Shared helpers for integration tests.

use futures::future::{self, BoxFuture, FutureExt};
use schema_linker::cache::ContextFactory;
use schema_linker::core::SourceError;
use schema_linker::linker::LinkConfig;
use schema_linker::source::{ParsedSource, SourceIdentifier, SourceParser, SourceProvider};
use schema_linker::test_utils::{CountingLinker, MockParser};
use std::collections::HashMap;
use std::sync::Arc;

/// Serves `MockParser` texts under the identifiers they were requested with.
pub struct TextProvider {
    sources: HashMap<SourceIdentifier, ParsedSource>,
}

impl TextProvider {
    /// Each text is served under the identifier its header declares.
    pub fn new(texts: &[&str]) -> Self {
        let sources = texts
            .iter()
            .map(|text| {
                let parsed = MockParser.parse(&SourceIdentifier::new("unknown"), text).unwrap();
                (parsed.id().clone(), parsed)
            })
            .collect();
        Self { sources }
    }

    /// Serve `text` under `requested`, whatever the text declares.
    pub fn with_alias(mut self, requested: SourceIdentifier, text: &str) -> Self {
        let parsed = MockParser.parse(&requested, text).unwrap();
        self.sources.insert(requested, parsed);
        self
    }
}

impl SourceProvider for TextProvider {
    fn get_source<'a>(
        &'a self,
        id: &'a SourceIdentifier,
    ) -> BoxFuture<'a, Result<ParsedSource, SourceError>> {
        let result = self.sources.get(id).cloned().ok_or_else(|| SourceError::Missing { id: id.clone() });
        future::ready(result).boxed()
    }
}

/// A factory over `provider` using `linker`.
pub fn factory(linker: &Arc<CountingLinker>, provider: TextProvider) -> ContextFactory<CountingLinker> {
    ContextFactory::new(Arc::clone(linker), Arc::new(provider), LinkConfig::default())
}

pub fn id(name: &str) -> SourceIdentifier {
    SourceIdentifier::new(name)
}
