//! Versioned registry of schema source texts.
//!
//! A [`TextSchemaRegistry`] accepts source texts, tracks which sources and
//! supported features are currently required, and serves the linked model for
//! that state.
//!
//! # State and versions
//!
//! Every mutation (registering or unregistering a source, changing a feature
//! set) publishes a new immutable [`RegistryState`] with a fresh version. The
//! state is swapped atomically, so a reader always sees a version together with
//! the source set that produced it. Mutations never trigger computation.
//!
//! # Reading the model
//!
//! [`TextSchemaRegistry::current_model`] runs an optimistic loop:
//!
//! 1. If the last published model was built for the current version, return it.
//! 2. Otherwise snapshot the state and ask the repository for a model over the
//!    required sources. When some sources cannot be resolved, retry with only
//!    the resolvable ones until linking succeeds or nothing is left.
//! 3. If the state changed while linking, discard the result and start over.
//!    Otherwise publish `(version, model)` with a compare-and-swap.
//!
//! No lock is held while linking. A stale computation is thrown away instead of
//! being published, so the stable model is valid exactly when its version
//! matches the current state.
//!
//! [`TextSchemaRegistry::cached_model`] is the non-blocking alternative: it
//! returns whatever was published last, even if the state moved on since.

mod store;

pub use store::SourceStore;

use anyhow::{Context, Result, anyhow};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::cache::SchemaContext;
use crate::config::RegistryConfig;
use crate::constants::{COST_IMMEDIATE, targets};
use crate::core::{SchemaError, SourceError};
use crate::linker::{LinkConfig, ParserMode, SchemaLinker};
use crate::repository::{ProviderRegistration, SchemaRepository};
use crate::source::{ParsedSource, SourceIdentifier, SourceParser, SourceProvider, check_identifier};

/// Immutable snapshot of what the registry requires.
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    /// Increases with every mutation
    pub version: u64,
    /// Required sources with their registration counts
    pub required: BTreeMap<SourceIdentifier, usize>,
    /// Supported features per module; empty means every feature is supported
    pub features: BTreeMap<String, BTreeSet<String>>,
}

impl RegistryState {
    /// Identifiers of the required sources.
    pub fn required_sources(&self) -> impl Iterator<Item = &SourceIdentifier> {
        self.required.keys()
    }
}

struct StableContext<M> {
    version: u64,
    context: SchemaContext<M>,
}

/// Non-generic registry internals shared with registration handles.
struct RegistryCore {
    name: String,
    store: Arc<SourceStore>,
    state: ArcSwap<RegistryState>,
    registrations: AtomicU64,
}

impl RegistryCore {
    /// Apply `mutate` to a copy of the current state and publish it with a new version.
    ///
    /// `mutate` returns `false` to leave the state untouched.
    fn update<F>(&self, mut mutate: F) -> Option<u64>
    where
        F: FnMut(&mut RegistryState) -> bool,
    {
        loop {
            let cur = self.state.load_full();
            let mut next = RegistryState::clone(&cur);
            if !mutate(&mut next) {
                return None;
            }
            next.version = cur.version + 1;
            let version = next.version;

            let next_arc = Arc::new(next);
            let prev = self.state.compare_and_swap(&cur, next_arc);
            if Arc::ptr_eq(&prev, &cur) {
                return Some(version);
            }
        }
    }

    fn unregister(&self, id: &SourceIdentifier, registration: u64) {
        // State before text: a reader that finds the source missing also sees a new version.
        let version = self.update(|state| match state.required.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                state.required.remove(id);
                true
            }
            None => false,
        });
        if self.store.remove(id, registration) {
            tracing::debug!(
                target: targets::REGISTRY,
                "Registry {} unregistered {} (version {:?})",
                self.name,
                id,
                version
            );
        }
    }
}

/// Handle to one registered source text.
///
/// Dropping the handle leaves the source registered; call
/// [`unregister`](Self::unregister) to remove it.
#[derive(Debug)]
pub struct SourceRegistration {
    core: Weak<RegistryCore>,
    id: SourceIdentifier,
    registration: u64,
}

impl SourceRegistration {
    /// The identifier the source was registered under (as declared by its content).
    pub fn id(&self) -> &SourceIdentifier {
        &self.id
    }

    /// Remove the source from the registry.
    pub fn unregister(self) {
        if let Some(core) = self.core.upgrade() {
            core.unregister(&self.id, self.registration);
        }
    }
}

/// Registry of source texts serving the linked model of everything registered.
pub struct TextSchemaRegistry<L: SchemaLinker> {
    parser: Arc<dyn SourceParser>,
    repository: Arc<SchemaRepository<L>>,
    core: Arc<RegistryCore>,
    mode: ParserMode,
    deviations: BTreeMap<String, BTreeSet<String>>,
    stable: ArcSwapOption<StableContext<L::Model>>,
    _store_registration: ProviderRegistration,
}

impl<L: SchemaLinker> TextSchemaRegistry<L> {
    /// Create a registry with its own repository.
    pub fn new(name: impl Into<String>, parser: Arc<dyn SourceParser>, linker: Arc<L>) -> Self {
        let name = name.into();
        let repository = Arc::new(SchemaRepository::new(name.clone(), linker));
        Self::with_repository(name, parser, repository)
    }

    /// Create a registry serving its sources through a shared repository.
    pub fn with_repository(
        name: impl Into<String>,
        parser: Arc<dyn SourceParser>,
        repository: Arc<SchemaRepository<L>>,
    ) -> Self {
        let store = Arc::new(SourceStore::new());
        let store_registration =
            repository.register_provider(Arc::clone(&store) as Arc<dyn SourceProvider>, COST_IMMEDIATE);
        Self {
            parser,
            repository,
            core: Arc::new(RegistryCore {
                name: name.into(),
                store,
                state: ArcSwap::from_pointee(RegistryState::default()),
                registrations: AtomicU64::new(0),
            }),
            mode: ParserMode::default(),
            deviations: BTreeMap::new(),
            stable: ArcSwapOption::empty(),
            _store_registration: store_registration,
        }
    }

    /// Create a registry from configuration.
    pub fn from_config(config: &RegistryConfig, parser: Arc<dyn SourceParser>, linker: Arc<L>) -> Self {
        let mut registry = Self::new(config.name.clone(), parser, linker).with_mode(config.parser_mode);
        registry.deviations = config.deviations.clone();
        for (module, features) in &config.features {
            registry.set_features(module.clone(), features.iter().cloned());
        }
        registry
    }

    /// Use `mode` when linking.
    pub fn with_mode(mut self, mode: ParserMode) -> Self {
        self.mode = mode;
        self
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The repository models are built through.
    pub fn repository(&self) -> &Arc<SchemaRepository<L>> {
        &self.repository
    }

    /// Current state snapshot.
    pub fn state(&self) -> Arc<RegistryState> {
        self.core.state.load_full()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.core.state.load().version
    }

    /// Parse `text` and add it to the required sources.
    ///
    /// The source is registered under the identifier its content declares;
    /// a differing `requested` identifier is logged and corrected.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Source`] if the parser rejects the text.
    pub fn register_source(
        &self,
        requested: SourceIdentifier,
        text: &str,
    ) -> Result<SourceRegistration, SchemaError> {
        let parsed = self.parser.parse(&requested, text)?;
        check_identifier(&requested, parsed.id());

        let id = parsed.id().clone();
        let registration = self.core.registrations.fetch_add(1, Ordering::Relaxed);
        self.core.store.insert(registration, parsed);
        let version = self.core.update(|state| {
            *state.required.entry(id.clone()).or_default() += 1;
            true
        });

        tracing::debug!(
            target: targets::REGISTRY,
            "Registry {} registered {} (version {:?})",
            self.core.name,
            id,
            version
        );
        Ok(SourceRegistration {
            core: Arc::downgrade(&self.core),
            id,
            registration,
        })
    }

    /// Read a source file and register it, guessing its identifier from the file name.
    pub async fn register_file(&self, path: impl AsRef<Path>) -> Result<SourceRegistration> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid schema file name: {}", path.display()))?;
        let requested = SourceIdentifier::from_file_name(file_name);

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema source: {}", path.display()))?;

        self.register_source(requested, &text)
            .with_context(|| format!("Failed to register schema source: {}", path.display()))
    }

    /// Declare the supported features of `module`, replacing any previous set.
    pub fn set_features<I, S>(&self, module: impl Into<String>, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = module.into();
        let features: BTreeSet<String> = features.into_iter().map(Into::into).collect();
        let version = self.core.update(|state| {
            if state.features.get(&module) == Some(&features) {
                return false;
            }
            state.features.insert(module.clone(), features.clone());
            true
        });
        if let Some(version) = version {
            tracing::debug!(
                target: targets::REGISTRY,
                "Registry {} set features of {} (version {})",
                self.core.name,
                module,
                version
            );
        }
    }

    /// Forget the supported-feature set of `module`. Returns whether one existed.
    pub fn remove_features(&self, module: &str) -> bool {
        self.core.update(|state| state.features.remove(module).is_some()).is_some()
    }

    /// Fetch a registered source.
    pub async fn get_source(&self, id: &SourceIdentifier) -> Result<ParsedSource, SourceError> {
        self.core.store.get_source(id).await
    }

    /// Point-in-time set of registered identifiers.
    pub fn available_sources(&self) -> BTreeSet<SourceIdentifier> {
        self.core.store.available_sources()
    }

    /// Every text registered under `id`, oldest first.
    pub fn source_texts(&self, id: &SourceIdentifier) -> Vec<ParsedSource> {
        self.core.store.source_texts(id)
    }

    fn link_config(&self, state: &RegistryState) -> LinkConfig {
        LinkConfig {
            mode: self.mode,
            supported_features: (!state.features.is_empty()).then(|| state.features.clone()),
            deviations: self.deviations.clone(),
        }
    }

    /// The last published model, even if the state has changed since.
    pub fn cached_model(&self) -> Option<SchemaContext<L::Model>> {
        self.stable.load_full().map(|stable| stable.context.clone())
    }

    /// Link everything currently required in one attempt, without narrowing or publishing.
    ///
    /// # Errors
    ///
    /// Any [`SchemaError`], including [`SchemaError::Unresolved`] with the
    /// resolvable subset.
    pub async fn try_model(&self) -> Result<SchemaContext<L::Model>, SchemaError> {
        let state = self.core.state.load_full();
        if state.required.is_empty() {
            return Err(SchemaError::NoSources);
        }
        self.repository
            .create_model(&self.link_config(&state), state.required_sources().cloned())
            .await
    }

    /// The model for the current state, computing and publishing it if needed.
    ///
    /// Sources with unsatisfied dependencies are left out. Fails only when not
    /// even a subset of the required sources can be linked.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::NoSources`] if nothing is registered
    /// - [`SchemaError::Unresolved`] if no subset resolves
    /// - any other [`SchemaError`] from fetching or linking
    pub async fn current_model(&self) -> Result<SchemaContext<L::Model>, SchemaError> {
        loop {
            let stable = self.stable.load_full();
            let state = self.core.state.load_full();
            if let Some(stable) = &stable
                && stable.version == state.version
            {
                return Ok(stable.context.clone());
            }
            if state.required.is_empty() {
                return Err(SchemaError::NoSources);
            }

            let outcome = self.link_narrowing(&state).await;

            let current = self.core.state.load().version;
            if current != state.version {
                tracing::debug!(
                    target: targets::REGISTRY,
                    "Registry {} changed from version {} to {} while linking, retrying",
                    self.core.name,
                    state.version,
                    current
                );
                continue;
            }

            let context = outcome?;
            let next = Arc::new(StableContext {
                version: state.version,
                context: context.clone(),
            });
            let prev = self.stable.compare_and_swap(&stable, Some(next));
            let published = match (&*prev, &stable) {
                (Some(prev), Some(cur)) => Arc::ptr_eq(prev, cur),
                (None, None) => true,
                _ => false,
            };
            if published {
                tracing::debug!(
                    target: targets::REGISTRY,
                    "Registry {} published model for version {}",
                    self.core.name,
                    state.version
                );
                return Ok(context);
            }
        }
    }

    /// Link the required sources of `state`, dropping unresolvable ones until linking succeeds.
    async fn link_narrowing(&self, state: &RegistryState) -> Result<SchemaContext<L::Model>, SchemaError> {
        let factory = self.repository.factory_for(&self.link_config(state));
        let mut request: Vec<SourceIdentifier> = state.required_sources().cloned().collect();
        loop {
            match factory.create_model(request.iter().cloned()).await {
                Err(SchemaError::Unresolved(failure)) => {
                    let narrowed = failure.resolved_sources.len();
                    if narrowed == 0 || narrowed >= request.len() {
                        return Err(SchemaError::Unresolved(failure));
                    }
                    tracing::debug!(
                        target: targets::REGISTRY,
                        "Registry {} narrowing from {} to {} source(s): {}",
                        self.core.name,
                        request.len(),
                        narrowed,
                        failure
                    );
                    request = failure.resolved_sources;
                }
                outcome => return outcome,
            }
        }
    }
}
