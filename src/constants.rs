//! Global constants used throughout the crate.
//!
//! File naming conventions, the revision date format and the relative costs
//! used to order source providers live here so that magic values stay
//! discoverable.

/// File extension of textual schema sources.
pub const SOURCE_FILE_EXTENSION: &str = ".yang";

/// Separator between a module name and its revision in file names (`name@2020-01-01.yang`).
pub const REVISION_SEPARATOR: char = '@';

/// `chrono` format string for revision dates.
pub const REVISION_FORMAT: &str = "%Y-%m-%d";

/// Cost of a provider that already holds parsed sources in memory.
pub const COST_IMMEDIATE: u32 = 0;

/// Cost of a provider that has to compute the source (e.g. transform another representation).
pub const COST_COMPUTATION: u32 = 1;

/// Cost of a provider that reads sources from the local filesystem.
pub const COST_LOCAL_IO: u32 = 4;

/// Cost of a provider that fetches sources over the network.
pub const COST_REMOTE_IO: u32 = 64;

/// Tracing targets, one per component.
pub mod targets {
    /// Dependency resolution.
    pub const RESOLVER: &str = "schema::resolver";
    /// Compute cache transitions.
    pub const CACHE: &str = "schema::cache";
    /// Repository and provider routing.
    pub const REPOSITORY: &str = "schema::repository";
    /// Versioned registry.
    pub const REGISTRY: &str = "schema::registry";
    /// Source identifiers and reconciliation.
    pub const SOURCE: &str = "schema::source";
}
