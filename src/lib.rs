//! schema-linker - dependency resolution and memoized linking of module schemas
//!
//! Turns a changing collection of schema source texts (YANG-style modules and
//! submodules that import, include and belong to one another) into a single,
//! immutable linked model, and keeps that model cached for as long as anyone
//! uses it.
//!
//! # Architecture Overview
//!
//! ```text
//!   text ──SourceParser──▶ ParsedSource ──SourceStore──┐
//!                                                       ▼
//!   TextSchemaRegistry ──▶ SchemaRepository ──▶ ContextFactory ──▶ assemble_sources ──▶ SchemaLinker
//!     (versions,            (factory per         (single-flight,     (resolve, order)
//!      optimistic publish)   LinkConfig)          weak retention)
//! ```
//!
//! - Parsing and linking proper are external services behind the
//!   [`SourceParser`](source::SourceParser) and [`SchemaLinker`](linker::SchemaLinker)
//!   traits.
//! - The [`DependencyResolver`](resolver::DependencyResolver) finds the maximal
//!   subset of sources whose references can all be satisfied.
//! - The [`ContextFactory`](cache::ContextFactory) runs at most one link per
//!   source set at a time and forgets a model once the last handle is dropped.
//! - The [`TextSchemaRegistry`](registry::TextSchemaRegistry) narrows away
//!   unresolvable sources and publishes a model only if nothing changed while
//!   it was being built.
//!
//! # Core Modules
//!
//! - [`cache`] - single-flight compute cache and [`SchemaContext`](cache::SchemaContext) handles
//! - [`config`] - TOML registry configuration
//! - [`constants`] - file naming, revision format, provider costs, log targets
//! - [`core`] - error types and user-facing error presentation
//! - [`linker`] - linker seam, link configuration, source assembly
//! - [`registry`] - versioned registry of source texts
//! - [`repository`] - provider routing and factory-per-configuration
//! - [`resolver`] - fixed-point dependency resolution and link ordering
//! - [`source`] - identifiers, dependency info, reconciliation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schema_linker::registry::TextSchemaRegistry;
//! use schema_linker::source::SourceIdentifier;
//! # use schema_linker::linker::SchemaLinker;
//! # use schema_linker::source::SourceParser;
//!
//! # async fn example<L: SchemaLinker>(parser: Arc<dyn SourceParser>, linker: Arc<L>) -> anyhow::Result<()> {
//! let registry = TextSchemaRegistry::new("device", parser, linker);
//! let _types = registry.register_file("models/ietf-inet-types@2013-07-15.yang").await?;
//! let _app = registry.register_source(SourceIdentifier::new("app"), "module app { ... }")?;
//!
//! let model = registry.current_model().await?;
//! println!("linked {} source(s)", model.sources().len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod core;
pub mod linker;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod source;

// test_utils is available for unit tests and, with the `test-utils` feature, integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
