//! Schema sources: identities, dependency info and the seams to the outside world.
//!
//! The crate never parses schema grammar itself. Text becomes a [`ParsedSource`]
//! through a [`SourceParser`], and sources are fetched on demand through
//! [`SourceProvider`]s. Both are supplied by the embedding application.
//!
//! # Identifiers
//!
//! A [`SourceIdentifier`] is a name plus an optional [`Revision`]. Two
//! identifiers with the same name and different revisions are distinct. A
//! reference ([`SourceDependency`]) without a revision may be satisfied by any
//! revision of that name during resolution, but cache keys always match exactly.
//!
//! # Reconciliation
//!
//! [`reconcile`] compares the identifier a source was requested under with the
//! one its content declares, logs the discrepancy and collapses duplicates.

mod identifier;
pub mod reconcile;

pub use identifier::{ParsedSource, Revision, SourceDependency, SourceIdentifier, SourceInfo};
pub use reconcile::{IdentifierMismatch, check_identifier, reconcile};

use futures::future::BoxFuture;

use crate::core::SourceError;

/// Turns raw source text into a [`ParsedSource`].
///
/// `requested` is the identifier the caller supplied with the text; the parser
/// reports whatever identifier the text itself declares.
pub trait SourceParser: Send + Sync {
    /// Parse `text`, reporting failures as [`SourceError::Parse`].
    fn parse(&self, requested: &SourceIdentifier, text: &str) -> Result<ParsedSource, SourceError>;
}

/// Asynchronously supplies parsed sources by identifier.
///
/// A provider that does not know an identifier answers [`SourceError::Missing`].
pub trait SourceProvider: Send + Sync {
    /// Fetch the source registered under `id`.
    fn get_source<'a>(
        &'a self,
        id: &'a SourceIdentifier,
    ) -> BoxFuture<'a, Result<ParsedSource, SourceError>>;
}
