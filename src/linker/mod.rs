//! Assembly of parsed sources into one linked model.
//!
//! The actual cross-reference linking is done by an external [`SchemaLinker`].
//! This module decides what the linker gets to see: [`assemble_sources`]
//! indexes the sources, resolves their dependencies, refuses to link anything
//! unresolved, and hands the resolvable set over in dependency order.
//!
//! # Configuration
//!
//! A [`LinkConfig`] captures everything that changes the linker's output for
//! the same inputs: the [`ParserMode`], the supported-feature set and the
//! per-module deviation set. It is hashable and used as the key that selects
//! a compute cache in the repository.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::constants::targets;
use crate::core::{ResolutionFailure, SchemaError};
use crate::resolver::{DependencyGraph, DependencyResolver};
use crate::source::{ParsedSource, SourceIdentifier, SourceInfo};

/// Statement parser mode passed through to the linker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserMode {
    /// Plain revision-based linking.
    #[default]
    Default,
    /// Semantic-version aware linking.
    Semver,
}

/// Everything besides the source set that determines a linked model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LinkConfig {
    /// Statement parser mode
    pub mode: ParserMode,
    /// Supported features per module namespace; `None` means every feature is supported
    pub supported_features: Option<BTreeMap<String, BTreeSet<String>>>,
    /// Deviation modules per target module
    pub deviations: BTreeMap<String, BTreeSet<String>>,
}

impl LinkConfig {
    /// Default configuration in the given mode.
    pub fn with_mode(mode: ParserMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Whether `feature` of `module` is enabled under this configuration.
    pub fn is_feature_supported(&self, module: &str, feature: &str) -> bool {
        match &self.supported_features {
            None => true,
            Some(features) => features.get(module).is_some_and(|set| set.contains(feature)),
        }
    }
}

/// Structural failure reported by the linker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LinkError {
    /// The offending source, when known
    pub source_id: Option<SourceIdentifier>,
    /// Linker diagnostic
    pub message: String,
}

impl LinkError {
    /// Failure attributed to one source.
    pub fn in_source(source_id: SourceIdentifier, message: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id),
            message: message.into(),
        }
    }

    /// Failure not attributable to a single source.
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            source_id: None,
            message: message.into(),
        }
    }
}

impl From<LinkError> for SchemaError {
    fn from(error: LinkError) -> Self {
        SchemaError::Structural {
            source_id: error.source_id,
            message: error.message,
        }
    }
}

/// External service that turns an ordered, fully resolvable source set into a linked model.
///
/// Linked models are immutable once built and are shared between callers.
pub trait SchemaLinker: Send + Sync + 'static {
    /// The linked model type.
    type Model: Send + Sync + 'static;

    /// Link `sources`, which arrive dependencies first.
    fn link<'a>(
        &'a self,
        sources: Vec<ParsedSource>,
        config: &'a LinkConfig,
    ) -> BoxFuture<'a, Result<Self::Model, LinkError>>;
}

/// Resolve and link `sources` into one model.
///
/// # Errors
///
/// - [`SchemaError::DuplicateSource`] if two sources declare the same identifier
/// - [`SchemaError::Unresolved`] if any source has unsatisfied references; the
///   payload carries the resolvable subset and the first-order missing references
/// - [`SchemaError::Structural`] if the linker rejects the content
pub async fn assemble_sources<L: SchemaLinker + ?Sized>(
    linker: &L,
    config: &LinkConfig,
    resolver: &DependencyResolver,
    sources: Vec<ParsedSource>,
) -> Result<L::Model, SchemaError> {
    let mut by_id: BTreeMap<SourceIdentifier, ParsedSource> = BTreeMap::new();
    for source in sources {
        let id = source.id().clone();
        if by_id.insert(id.clone(), source).is_some() {
            return Err(SchemaError::DuplicateSource(id));
        }
    }

    let infos: BTreeMap<SourceIdentifier, SourceInfo> =
        by_id.iter().map(|(id, source)| (id.clone(), source.info().clone())).collect();

    let resolution = resolver.resolve(&infos);
    if !resolution.is_complete() {
        tracing::debug!(
            target: targets::RESOLVER,
            "Unresolved sources {:?}, missing {:?}",
            resolution.unresolved_sources,
            resolution.unsatisfied_imports
        );
        return Err(SchemaError::Unresolved(ResolutionFailure::from(resolution)));
    }

    let order =
        DependencyGraph::from_resolved(&infos, &resolution.resolved_sources, resolver.matcher())
            .topological_order()
            .map_err(|e| SchemaError::Structural {
                source_id: None,
                message: e.to_string(),
            })?;

    let ordered: Vec<ParsedSource> = order.iter().filter_map(|id| by_id.remove(id)).collect();
    tracing::debug!(
        target: targets::RESOLVER,
        "Linking {} source(s) in mode {:?}",
        ordered.len(),
        config.mode
    );

    linker.link(ordered, config).await.map_err(SchemaError::from)
}
