//! Single-flight compute cache of linked models.
//!
//! A [`ContextFactory`] turns a set of source identifiers into a linked
//! [`SchemaContext`] and remembers the result for exactly as long as someone
//! outside the cache still holds it.
//!
//! # Architecture Overview
//!
//! - Entries are keyed by [`SourceSet`], an order-independent set of exact
//!   identifiers. Duplicate identifiers in a request are dropped with a warning.
//! - Each key maps to a [`CacheEntry`] in a [`DashMap`]; all state transitions
//!   happen through the entry API so two requesters never race on one key.
//! - A computation is spawned once per key and its outcome is fanned out to every
//!   requester through a [`Shared`] future.
//!
//! # Entry Lifecycle
//!
//! ```text
//!   (absent) --request--> Computing --success--> Computed(weak) --last handle dropped--> (absent)
//!                             |
//!                             +------failure----> (absent)
//! ```
//!
//! - **Computing**: the in-flight shared future. Every concurrent requester
//!   clones it and observes the same outcome.
//! - **Computed**: a [`Weak`] reference to the model. The cache's hold does not
//!   keep the model alive. When the last [`SchemaContext`] handle is dropped, an
//!   eviction hook removes the entry if it still points at that model.
//! - Failures are never cached. The entry is removed before waiters are woken, so
//!   a waiter that retries immediately starts a fresh attempt.
//!
//! # Concurrency Notes
//!
//! - No strong model reference is ever dropped while a map guard is held. Dropping
//!   the last handle runs the eviction hook, which needs the same shard.
//! - The computing task moves into the `Computed` state while it still owns the
//!   model, then hands that ownership to the waiters. Waiters can therefore never
//!   observe a `Computed` entry whose model is not yet reachable.
//! - Computations are spawned on the caller's tokio runtime and run to
//!   completion even if every requester stops waiting.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{self, BoxFuture, FutureExt, Shared, try_join_all};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

use crate::constants::targets;
use crate::core::SchemaError;
use crate::linker::{LinkConfig, SchemaLinker, assemble_sources};
use crate::resolver::DependencyResolver;
use crate::source::{SourceIdentifier, SourceProvider, reconcile};

/// Future resolving to the outcome of one cache entry.
///
/// Cloning is cheap; every clone yields the same result.
pub type ModelFuture<M> = Shared<BoxFuture<'static, Result<SchemaContext<M>, SchemaError>>>;

/// Immutable, order-independent set of exact source identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceSet(Arc<BTreeSet<SourceIdentifier>>);

impl SourceSet {
    /// Build a key from requested identifiers, dropping duplicates.
    pub fn from_requested<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = SourceIdentifier>,
    {
        let mut set = BTreeSet::new();
        for id in ids {
            if !set.insert(id.clone()) {
                tracing::warn!(target: targets::CACHE, "Ignoring duplicate request for source {}", id);
            }
        }
        Self(Arc::new(set))
    }

    /// Identifiers in the set.
    pub fn iter(&self) -> impl Iterator<Item = &SourceIdentifier> {
        self.0.iter()
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `id` is in the set.
    pub fn contains(&self, id: &SourceIdentifier) -> bool {
        self.0.contains(id)
    }
}

impl Deref for SourceSet {
    type Target = BTreeSet<SourceIdentifier>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// State of one key in the cache.
enum CacheEntry<M> {
    /// A computation is running; requesters share its outcome.
    Computing {
        id: u64,
        future: ModelFuture<M>,
    },
    /// A model was built and may still be referenced by someone.
    Computed {
        id: u64,
        model: Weak<LinkedContext<M>>,
    },
}

impl<M> CacheEntry<M> {
    fn id(&self) -> u64 {
        match self {
            CacheEntry::Computing { id, .. } | CacheEntry::Computed { id, .. } => *id,
        }
    }
}

/// Runs a cleanup once, when dropped.
struct EvictionHook(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for EvictionHook {
    fn drop(&mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}

struct LinkedContext<M> {
    model: M,
    sources: SourceSet,
    // Dropped after `model`; runs once the last handle is gone.
    _eviction: EvictionHook,
}

/// Shared handle to a linked model.
///
/// The model stays cached while at least one handle exists.
pub struct SchemaContext<M> {
    inner: Arc<LinkedContext<M>>,
}

impl<M> SchemaContext<M> {
    /// The linked model.
    pub fn model(&self) -> &M {
        &self.inner.model
    }

    /// The source set this model was requested with.
    pub fn sources(&self) -> &SourceSet {
        &self.inner.sources
    }

    /// Whether both handles refer to the same linked instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<M> Clone for SchemaContext<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Deref for SchemaContext<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.inner.model
    }
}

impl<M: fmt::Debug> fmt::Debug for SchemaContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaContext")
            .field("sources", &self.inner.sources)
            .field("model", &self.inner.model)
            .finish()
    }
}

type EntryMap<M> = DashMap<SourceSet, CacheEntry<M>>;

struct FactoryInner<L: SchemaLinker> {
    config: LinkConfig,
    linker: Arc<L>,
    provider: Arc<dyn SourceProvider>,
    resolver: DependencyResolver,
    entries: Arc<EntryMap<L::Model>>,
    next_id: AtomicU64,
}

/// Memoizing, single-flight builder of linked models for one [`LinkConfig`].
pub struct ContextFactory<L: SchemaLinker> {
    inner: Arc<FactoryInner<L>>,
}

impl<L: SchemaLinker> Clone for ContextFactory<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: SchemaLinker> ContextFactory<L> {
    /// Create a factory fetching sources from `provider` and linking with `linker`.
    pub fn new(linker: Arc<L>, provider: Arc<dyn SourceProvider>, config: LinkConfig) -> Self {
        Self::with_resolver(linker, provider, config, DependencyResolver::new())
    }

    /// Create a factory with a custom dependency resolver.
    pub fn with_resolver(
        linker: Arc<L>,
        provider: Arc<dyn SourceProvider>,
        config: LinkConfig,
        resolver: DependencyResolver,
    ) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                config,
                linker,
                provider,
                resolver,
                entries: Arc::new(DashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// The configuration every model of this factory is linked with.
    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// Get or build the model for `ids`.
    ///
    /// Concurrent calls with the same identifier set share one computation. A
    /// successful result is returned from cache for as long as any handle to it
    /// is alive; a failure is returned to every waiter of that attempt and then
    /// forgotten.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_model<I>(&self, ids: I) -> ModelFuture<L::Model>
    where
        I: IntoIterator<Item = SourceIdentifier>,
    {
        let key = SourceSet::from_requested(ids);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return future::ready(Err(SchemaError::Other {
                message: "Linked models can only be built inside a tokio runtime".to_string(),
            }))
            .boxed()
            .shared();
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let shared: ModelFuture<L::Model> = rx
            .map(|outcome| {
                outcome.unwrap_or_else(|_| {
                    Err(SchemaError::Aborted("model computation ended without a result".to_string()))
                })
            })
            .boxed()
            .shared();

        match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                CacheEntry::Computing { future, .. } => {
                    tracing::trace!(target: targets::CACHE, "Joining computation of {}", key);
                    return future.clone();
                }
                CacheEntry::Computed { model, .. } => {
                    if let Some(model) = model.upgrade() {
                        tracing::trace!(target: targets::CACHE, "Cache hit for {}", key);
                        return future::ready(Ok(SchemaContext { inner: model })).boxed().shared();
                    }
                    tracing::debug!(
                        target: targets::CACHE,
                        "Cached model for {} was released, recomputing",
                        key
                    );
                    occupied.insert(CacheEntry::Computing {
                        id,
                        future: shared.clone(),
                    });
                }
            },
            Entry::Vacant(vacant) => {
                tracing::debug!(target: targets::CACHE, "Computing model for {}", key);
                vacant.insert(CacheEntry::Computing {
                    id,
                    future: shared.clone(),
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let pending = PendingEntry {
                entries: Arc::clone(&inner.entries),
                key: key.clone(),
                id,
            };
            let outcome = compute(&inner, key, id).await;
            // Failed attempts leave the map before anyone is woken.
            drop(pending);
            if tx.send(outcome).is_err() {
                tracing::trace!(target: targets::CACHE, "No requester left for computation {}", id);
            }
        });

        shared
    }

    /// Number of keys currently tracked (computing or computed).
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Whether a live or in-flight model exists for exactly `ids`.
    pub fn contains<I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = SourceIdentifier>,
    {
        let key = SourceSet(Arc::new(ids.into_iter().collect()));
        self.inner.entries.get(&key).is_some_and(|entry| match entry.value() {
            CacheEntry::Computing { .. } => true,
            CacheEntry::Computed { model, .. } => model.strong_count() > 0,
        })
    }

    /// Whether this factory is referenced from anywhere besides `self`.
    pub(crate) fn is_shared(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }
}

/// Removes a still-computing entry when the computation ends without publishing.
struct PendingEntry<M> {
    entries: Arc<EntryMap<M>>,
    key: SourceSet,
    id: u64,
}

impl<M> Drop for PendingEntry<M> {
    fn drop(&mut self) {
        let id = self.id;
        let removed = self.entries.remove_if(&self.key, |_, entry| {
            matches!(entry, CacheEntry::Computing { id: current, .. } if *current == id)
        });
        if removed.is_some() {
            tracing::debug!(target: targets::CACHE, "Discarded failed computation of {}", self.key);
        }
    }
}

async fn compute<L: SchemaLinker>(
    inner: &FactoryInner<L>,
    key: SourceSet,
    id: u64,
) -> Result<SchemaContext<L::Model>, SchemaError> {
    let requested: Vec<SourceIdentifier> = key.iter().cloned().collect();
    let fetched =
        try_join_all(requested.iter().map(|source_id| inner.provider.get_source(source_id))).await?;
    let sources = reconcile(&requested, fetched);

    let model =
        assemble_sources(inner.linker.as_ref(), &inner.config, &inner.resolver, sources).await?;

    let entries = Arc::downgrade(&inner.entries);
    let evicted_key = key.clone();
    let hook = move || {
        let Some(entries) = entries.upgrade() else {
            return;
        };
        let removed = entries.remove_if(&evicted_key, |_, entry| {
            matches!(entry, CacheEntry::Computed { id: current, .. } if *current == id)
        });
        if removed.is_some() {
            tracing::debug!(target: targets::CACHE, "Evicted unreferenced model for {}", evicted_key);
        }
    };

    let context = SchemaContext {
        inner: Arc::new(LinkedContext {
            model,
            sources: key.clone(),
            _eviction: EvictionHook(Some(Box::new(hook))),
        }),
    };

    // Publish while `context` still owns the model.
    if let Some(mut entry) = inner.entries.get_mut(&key)
        && entry.id() == id
    {
        *entry = CacheEntry::Computed {
            id,
            model: Arc::downgrade(&context.inner),
        };
        tracing::debug!(target: targets::CACHE, "Cached model for {}", key);
    }

    Ok(context)
}
