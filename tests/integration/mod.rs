//! Integration test suite for schema-linker
//!
//! End-to-end tests of the public API: the compute cache under concurrency,
//! provider routing through a repository, and the versioned registry.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=schema=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **cache**: single-flight, eviction, failure handling, key normalization
//! - **registry**: narrowing, optimistic publication, registration lifecycle
//! - **repository**: provider costs and repositories shared between registries

mod cache;
mod common;
mod registry;
mod repository;
