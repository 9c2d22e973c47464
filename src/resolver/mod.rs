//! Dependency resolution over declared source references.
//!
//! Given the [`SourceInfo`] of every candidate source, the resolver computes the
//! maximal subset whose imports, includes and belongs-to references can all be
//! satisfied, and classifies the rest as unresolved.
//!
//! # Algorithm
//!
//! Fixed-point iteration:
//!
//! 1. Start with every source pending and nothing resolved.
//! 2. Sweep the pending sources in identifier order. A source whose imports and
//!    includes are all satisfied by the resolved set moves to resolved.
//! 3. Repeat until a sweep makes no progress.
//! 4. Demote submodules whose parent module did not resolve, then anything
//!    whose references relied on a demoted source, until stable.
//! 5. Whatever is still pending is unresolved. For each unresolved source,
//!    record the references that nothing in the *input* can satisfy.
//!
//! Step 5 deliberately looks only at each source's own references: a source
//! that is unresolved merely because its dependency is unresolved does not
//! inherit that dependency's missing references. The diagnostic names exactly
//! what has to be added, not a cascade.
//!
//! Belongs-to references are checked against the input set rather than the
//! resolved set during the sweep. A module includes its submodules and each
//! submodule belongs to the module, so requiring the parent to be resolved
//! first would make every module with submodules unresolvable. Step 4 restores
//! the invariants: a resolved submodule has a resolved parent, and every
//! import or include of a resolved source is satisfied by a source that
//! resolved before it.
//!
//! ## Complexity
//!
//! O(n²) sweeps in the worst case (a chain given in reverse order), each
//! reference check is a `BTreeSet` range scan. `n` is tens to low thousands.
//!
//! # Revision matching
//!
//! How a reference is matched against identifiers is a [`RevisionMatcher`]
//! strategy. [`WildcardRevisionMatcher`] (the default) prefers an exact match
//! and lets a revision-less reference match any revision of the name;
//! [`ExactRevisionMatcher`] requires the exact identifier.

pub mod dependency_graph;


pub use dependency_graph::DependencyGraph;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::constants::targets;
use crate::core::ResolutionFailure;
use crate::source::{SourceDependency, SourceIdentifier, SourceInfo};

/// Policy for matching a reference against available identifiers.
pub trait RevisionMatcher: Send + Sync + fmt::Debug {
    /// Every identifier in `available` that satisfies `dependency`.
    fn candidates(
        &self,
        dependency: &SourceDependency,
        available: &BTreeSet<SourceIdentifier>,
    ) -> Vec<SourceIdentifier>;

    /// Whether anything in `available` satisfies `dependency`.
    fn is_satisfied(
        &self,
        dependency: &SourceDependency,
        available: &BTreeSet<SourceIdentifier>,
    ) -> bool {
        !self.candidates(dependency, available).is_empty()
    }
}

/// Exact identifier first; a reference without a revision falls back to any
/// revision of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardRevisionMatcher;

impl RevisionMatcher for WildcardRevisionMatcher {
    fn candidates(
        &self,
        dependency: &SourceDependency,
        available: &BTreeSet<SourceIdentifier>,
    ) -> Vec<SourceIdentifier> {
        let exact = dependency.to_identifier();
        if available.contains(&exact) {
            return vec![exact];
        }
        if dependency.revision().is_some() {
            return Vec::new();
        }
        same_name(dependency.name(), available).cloned().collect()
    }

    fn is_satisfied(
        &self,
        dependency: &SourceDependency,
        available: &BTreeSet<SourceIdentifier>,
    ) -> bool {
        if dependency.revision().is_some() {
            return available.contains(&dependency.to_identifier());
        }
        same_name(dependency.name(), available).next().is_some()
    }
}

/// Only the literal identifier named by the reference satisfies it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactRevisionMatcher;

impl RevisionMatcher for ExactRevisionMatcher {
    fn candidates(
        &self,
        dependency: &SourceDependency,
        available: &BTreeSet<SourceIdentifier>,
    ) -> Vec<SourceIdentifier> {
        let exact = dependency.to_identifier();
        if available.contains(&exact) {
            vec![exact]
        } else {
            Vec::new()
        }
    }
}

fn same_name<'a>(
    name: &'a str,
    available: &'a BTreeSet<SourceIdentifier>,
) -> impl Iterator<Item = &'a SourceIdentifier> + 'a {
    available.range(SourceIdentifier::lower_bound(name)..).take_while(move |id| id.name() == name)
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    /// Resolvable sources, in the order they resolved; each one's imports and
    /// includes are satisfied by sources earlier in the list
    pub resolved_sources: Vec<SourceIdentifier>,
    /// Sources that could not be resolved, in identifier order
    pub unresolved_sources: Vec<SourceIdentifier>,
    /// First-order missing references of unresolved sources
    pub unsatisfied_imports: BTreeMap<SourceIdentifier, BTreeSet<SourceDependency>>,
}

impl ResolutionResult {
    /// Whether every source resolved.
    pub fn is_complete(&self) -> bool {
        self.unresolved_sources.is_empty()
    }
}

impl From<ResolutionResult> for ResolutionFailure {
    fn from(result: ResolutionResult) -> Self {
        ResolutionFailure {
            resolved_sources: result.resolved_sources,
            unresolved_sources: result.unresolved_sources,
            unsatisfied_imports: result.unsatisfied_imports,
        }
    }
}

/// Fixed-point dependency resolver with a pluggable [`RevisionMatcher`].
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    matcher: Arc<dyn RevisionMatcher>,
}

impl DependencyResolver {
    /// Resolver using [`WildcardRevisionMatcher`].
    pub fn new() -> Self {
        Self::with_matcher(Arc::new(WildcardRevisionMatcher))
    }

    /// Resolver using a custom matching policy.
    pub fn with_matcher(matcher: Arc<dyn RevisionMatcher>) -> Self {
        Self { matcher }
    }

    /// The matching policy in use.
    pub fn matcher(&self) -> &dyn RevisionMatcher {
        self.matcher.as_ref()
    }

    /// Compute the maximal resolvable subset of `sources`.
    pub fn resolve(&self, sources: &BTreeMap<SourceIdentifier, SourceInfo>) -> ResolutionResult {
        let everything: BTreeSet<SourceIdentifier> = sources.keys().cloned().collect();
        let mut pending: BTreeMap<&SourceIdentifier, &SourceInfo> = sources.iter().collect();
        let mut resolved: BTreeSet<SourceIdentifier> = BTreeSet::new();
        let mut order: Vec<SourceIdentifier> = Vec::with_capacity(sources.len());

        loop {
            let before = pending.len();
            pending.retain(|id, info| {
                let ready = info.requirements().all(|dep| self.matcher.is_satisfied(dep, &resolved))
                    && info
                        .belongs_to
                        .as_ref()
                        .is_none_or(|parent| self.matcher.is_satisfied(parent, &everything));
                if ready {
                    resolved.insert((*id).clone());
                    order.push((*id).clone());
                }
                !ready
            });
            if pending.len() == before || pending.is_empty() {
                break;
            }
        }

        // Demoting an orphaned submodule can strand whatever resolved through
        // it, so re-check the surviving order until nothing changes.
        loop {
            let mut kept: BTreeSet<SourceIdentifier> = BTreeSet::new();
            let mut stranded: Vec<SourceIdentifier> = Vec::new();
            for id in &order {
                let satisfied = sources.get(id).is_some_and(|info| {
                    info.requirements().all(|dep| self.matcher.is_satisfied(dep, &kept))
                });
                if satisfied {
                    kept.insert(id.clone());
                } else {
                    stranded.push(id.clone());
                }
            }
            let orphans: Vec<SourceIdentifier> = kept
                .iter()
                .filter(|id| {
                    sources.get(*id).and_then(|info| info.belongs_to.as_ref()).is_some_and(|parent| {
                        !self.matcher.is_satisfied(parent, &kept)
                    })
                })
                .cloned()
                .collect();
            if stranded.is_empty() && orphans.is_empty() {
                break;
            }

            for id in &orphans {
                tracing::debug!(
                    target: targets::RESOLVER,
                    "Submodule {} demoted: parent module did not resolve",
                    id
                );
            }
            for id in &stranded {
                tracing::debug!(
                    target: targets::RESOLVER,
                    "Source {} demoted: a reference no longer resolves",
                    id
                );
            }
            for id in stranded.iter().chain(&orphans) {
                if let Some((id, info)) = sources.get_key_value(id) {
                    pending.insert(id, info);
                }
            }
            order.retain(|id| !stranded.contains(id) && !orphans.contains(id));
        }

        let mut unsatisfied_imports: BTreeMap<SourceIdentifier, BTreeSet<SourceDependency>> =
            BTreeMap::new();
        for (id, info) in &pending {
            let missing: BTreeSet<SourceDependency> = info
                .dependencies()
                .filter(|dep| !self.matcher.is_satisfied(dep, &everything))
                .cloned()
                .collect();
            if !missing.is_empty() {
                tracing::debug!(
                    target: targets::RESOLVER,
                    "Source {} has {} unsatisfied reference(s)",
                    id,
                    missing.len()
                );
                unsatisfied_imports.insert((*id).clone(), missing);
            }
        }

        let unresolved_sources: Vec<SourceIdentifier> =
            pending.keys().map(|id| (*id).clone()).collect();
        tracing::debug!(
            target: targets::RESOLVER,
            "Resolved {} of {} source(s)",
            order.len(),
            sources.len()
        );

        ResolutionResult {
            resolved_sources: order,
            unresolved_sources,
            unsatisfied_imports,
        }
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}
