//! In-memory store of registered source texts.

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::BTreeSet;

use crate::core::SourceError;
use crate::source::{ParsedSource, SourceIdentifier, SourceProvider};

/// Parsed sources by identifier, in registration order.
///
/// One identifier may be registered several times; lookups answer with the
/// earliest registration still present.
#[derive(Default)]
pub struct SourceStore {
    sources: DashMap<SourceIdentifier, Vec<(u64, ParsedSource)>>,
}

impl SourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, registration: u64, source: ParsedSource) {
        self.sources.entry(source.id().clone()).or_default().push((registration, source));
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: &SourceIdentifier, registration: u64) -> bool {
        let mut removed = false;
        if let Some(mut texts) = self.sources.get_mut(id) {
            let before = texts.len();
            texts.retain(|(r, _)| *r != registration);
            removed = texts.len() != before;
        }
        self.sources.remove_if(id, |_, texts| texts.is_empty());
        removed
    }

    /// The source registered first under `id`.
    pub fn get(&self, id: &SourceIdentifier) -> Option<ParsedSource> {
        self.sources.get(id).and_then(|texts| texts.first().map(|(_, source)| source.clone()))
    }

    /// Point-in-time set of identifiers with at least one registration.
    pub fn available_sources(&self) -> BTreeSet<SourceIdentifier> {
        self.sources.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Every registration under `id`, oldest first.
    pub fn source_texts(&self, id: &SourceIdentifier) -> Vec<ParsedSource> {
        self.sources
            .get(id)
            .map(|texts| texts.iter().map(|(_, source)| source.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceProvider for SourceStore {
    fn get_source<'a>(
        &'a self,
        id: &'a SourceIdentifier,
    ) -> BoxFuture<'a, Result<ParsedSource, SourceError>> {
        let result = self.get(id).ok_or_else(|| SourceError::Missing { id: id.clone() });
        future::ready(result).boxed()
    }
}
