//! Schema repository: one compute cache per link configuration.
//!
//! A [`SchemaRepository`] owns the source providers and hands out a
//! [`ContextFactory`] per distinct [`LinkConfig`]. Factories are cheap to
//! recreate, so one that nobody holds and that caches nothing is forgotten the
//! next time a factory is requested.
//!
//! # Provider Routing
//!
//! Providers are registered with a cost (see the `COST_*` constants). A fetch
//! tries them cheapest first and returns the first success. A provider that
//! does not know the identifier is skipped silently; other failures are kept
//! and reported if nothing succeeds.

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::cache::{ContextFactory, ModelFuture};
use crate::constants::targets;
use crate::core::SourceError;
use crate::linker::{LinkConfig, SchemaLinker};
use crate::resolver::DependencyResolver;
use crate::source::{ParsedSource, SourceIdentifier, SourceProvider};

struct ProviderSlot {
    cost: u32,
    provider: Arc<dyn SourceProvider>,
}

/// Cost-ordered fan-out over the registered providers.
#[derive(Default)]
struct ProviderRouter {
    providers: DashMap<u64, ProviderSlot>,
    next_id: AtomicU64,
}

impl ProviderRouter {
    fn add(&self, provider: Arc<dyn SourceProvider>, cost: u32) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.providers.insert(id, ProviderSlot { cost, provider });
        id
    }

    /// Snapshot of the providers, cheapest first, ties in registration order.
    fn by_cost(&self) -> Vec<Arc<dyn SourceProvider>> {
        let mut slots: Vec<(u32, u64, Arc<dyn SourceProvider>)> = self
            .providers
            .iter()
            .map(|slot| (slot.cost, *slot.key(), Arc::clone(&slot.provider)))
            .collect();
        slots.sort_by_key(|(cost, id, _)| (*cost, *id));
        slots.into_iter().map(|(_, _, provider)| provider).collect()
    }
}

impl SourceProvider for ProviderRouter {
    fn get_source<'a>(
        &'a self,
        id: &'a SourceIdentifier,
    ) -> BoxFuture<'a, Result<ParsedSource, SourceError>> {
        async move {
            let mut failure = None;
            for provider in self.by_cost() {
                match provider.get_source(id).await {
                    Ok(source) => return Ok(source),
                    Err(e) if e.is_missing() => {}
                    Err(e) => {
                        tracing::debug!(
                            target: targets::REPOSITORY,
                            "Provider failed for {}, trying next: {}",
                            id,
                            e
                        );
                        failure = Some(e);
                    }
                }
            }
            Err(failure.unwrap_or_else(|| SourceError::Missing { id: id.clone() }))
        }
        .boxed()
    }
}

/// Keeps a provider registered until dropped.
#[must_use = "the provider is unregistered when this handle is dropped"]
pub struct ProviderRegistration {
    router: Weak<ProviderRouter>,
    id: u64,
}

impl ProviderRegistration {
    /// Unregister the provider now.
    pub fn close(self) {}
}

impl Drop for ProviderRegistration {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade()
            && router.providers.remove(&self.id).is_some()
        {
            tracing::debug!(target: targets::REPOSITORY, "Unregistered provider {}", self.id);
        }
    }
}

/// Source providers plus a compute cache per link configuration.
pub struct SchemaRepository<L: SchemaLinker> {
    name: String,
    linker: Arc<L>,
    router: Arc<ProviderRouter>,
    resolver: DependencyResolver,
    factories: DashMap<LinkConfig, ContextFactory<L>>,
}

impl<L: SchemaLinker> SchemaRepository<L> {
    /// Create an empty repository.
    pub fn new(name: impl Into<String>, linker: Arc<L>) -> Self {
        Self::with_resolver(name, linker, DependencyResolver::new())
    }

    /// Create an empty repository whose factories resolve with `resolver`.
    pub fn with_resolver(name: impl Into<String>, linker: Arc<L>, resolver: DependencyResolver) -> Self {
        Self {
            name: name.into(),
            linker,
            router: Arc::new(ProviderRouter::default()),
            resolver,
            factories: DashMap::new(),
        }
    }

    /// Repository name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The linker every factory uses.
    pub fn linker(&self) -> &Arc<L> {
        &self.linker
    }

    /// Add a provider consulted at the given cost.
    pub fn register_provider(
        &self,
        provider: Arc<dyn SourceProvider>,
        cost: u32,
    ) -> ProviderRegistration {
        let id = self.router.add(provider, cost);
        tracing::debug!(
            target: targets::REPOSITORY,
            "Repository {} registered provider {} at cost {}",
            self.name,
            id,
            cost
        );
        ProviderRegistration {
            router: Arc::downgrade(&self.router),
            id,
        }
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.router.providers.len()
    }

    /// Fetch a source from the cheapest provider that has it.
    pub async fn get_source(&self, id: &SourceIdentifier) -> Result<ParsedSource, SourceError> {
        self.router.get_source(id).await
    }

    /// The compute cache for `config`, created on first use.
    pub fn factory_for(&self, config: &LinkConfig) -> ContextFactory<L> {
        let before = self.factories.len();
        self.factories.retain(|key, factory| key == config || factory.is_shared() || !factory.is_empty());
        let pruned = before - self.factories.len();
        if pruned > 0 {
            tracing::debug!(
                target: targets::REPOSITORY,
                "Repository {} forgot {} idle factory(ies)",
                self.name,
                pruned
            );
        }

        self.factories
            .entry(config.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    target: targets::REPOSITORY,
                    "Repository {} created factory for {:?}",
                    self.name,
                    config
                );
                ContextFactory::with_resolver(
                    Arc::clone(&self.linker),
                    Arc::clone(&self.router) as Arc<dyn SourceProvider>,
                    config.clone(),
                    self.resolver.clone(),
                )
            })
            .clone()
    }

    /// Shorthand for `factory_for(config).create_model(ids)`.
    pub fn create_model<I>(&self, config: &LinkConfig, ids: I) -> ModelFuture<L::Model>
    where
        I: IntoIterator<Item = SourceIdentifier>,
    {
        self.factory_for(config).create_model(ids)
    }

    /// Number of factories currently remembered.
    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }
}
