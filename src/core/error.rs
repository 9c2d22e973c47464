//! Error handling for schema assembly
//!
//! This module provides the error types shared by every layer of the crate and
//! a user-facing presentation helper. Errors fall into two families:
//! 1. **Structural** failures, where a source's own content is invalid. These are
//!    fatal for the attempt and are reported with the offending identifier.
//! 2. **Unsatisfied dependencies**, where some sources reference modules that are
//!    not available. These are recoverable: [`ResolutionFailure`] carries the
//!    resolvable subset so the caller can retry with less.
//!
//! # Architecture
//!
//! - [`SchemaError`] - Enumerated failure cases of resolution, fetching and linking
//! - [`SourceError`] - Failures tied to a single source (missing, unparsable, ...)
//! - [`ResolutionFailure`] - Partial-success payload of an unresolved assembly
//! - [`ErrorContext`] - Wrapper that adds user-friendly details and suggestions
//!
//! Every type here is `Clone`: a single in-flight assembly is shared by all
//! concurrent requesters, and each of them receives its own copy of the outcome.
//!
//! # Examples
//!
//! ```rust,no_run
//! use schema_linker::core::{SchemaError, user_friendly_error};
//!
//! fn assemble() -> Result<(), SchemaError> {
//!     Err(SchemaError::NoSources)
//! }
//!
//! if let Err(e) = assemble() {
//!     let ctx = user_friendly_error(anyhow::Error::from(e));
//!     ctx.display();
//! }
//! ```

use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::source::{SourceDependency, SourceIdentifier};

/// The main error type for resolution and linking.
///
/// # Error Categories
///
/// ## Recoverable
/// - [`SchemaError::Unresolved`] - some sources have unsatisfied imports, includes or
///   belongs-to references; the payload names the resolvable subset
///
/// ## Fatal for the attempt
/// - [`SchemaError::Structural`] - the linker rejected the content of a source
/// - [`SchemaError::DuplicateSource`] - two sources declare the same identifier
/// - [`SchemaError::Source`] - a source could not be fetched or parsed
/// - [`SchemaError::NoSources`] - nothing is registered
/// - [`SchemaError::Aborted`] - the computation died before producing an outcome
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    /// Some sources could not be resolved.
    ///
    /// This is the only error the registry treats as non-terminal: it narrows the
    /// requested set to [`ResolutionFailure::resolved_sources`] and tries again.
    #[error("{0}")]
    Unresolved(ResolutionFailure),

    /// A source's content is internally inconsistent.
    ///
    /// Reported by the external linker, never retried automatically.
    #[error("Failed to link {}: {message}", describe_source(.source_id.as_ref()))]
    Structural {
        /// The offending source, when the linker could identify it
        source_id: Option<SourceIdentifier>,
        /// Linker diagnostic
        message: String,
    },

    /// Two sources handed to assembly declare the same identifier.
    #[error("Duplicate source identifier {0}")]
    DuplicateSource(SourceIdentifier),

    /// A source could not be fetched or parsed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The registry has no sources to assemble.
    #[error("No sources are registered")]
    NoSources,

    /// The computation ended without reporting an outcome (panicked or was cancelled).
    #[error("Schema assembly aborted: {0}")]
    Aborted(String),

    /// Anything else: misuse such as building a model outside a tokio runtime, or a foreign error being presented.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl SchemaError {
    /// Whether a caller can recover by retrying with fewer sources.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, SchemaError::Unresolved(_))
    }

    /// Identifier of the source this error is attributed to, if any.
    pub fn source_id(&self) -> Option<&SourceIdentifier> {
        match self {
            SchemaError::Structural { source_id, .. } => source_id.as_ref(),
            SchemaError::DuplicateSource(id) => Some(id),
            SchemaError::Source(e) => Some(e.source_id()),
            _ => None,
        }
    }
}

fn describe_source(id: Option<&SourceIdentifier>) -> String {
    id.map_or_else(|| "schema".to_string(), |id| format!("source {id}"))
}

/// Failures tied to one source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// No provider knows about the identifier.
    #[error("Source {id} not registered")]
    Missing {
        /// The identifier that was requested
        id: SourceIdentifier,
    },

    /// The text could not be turned into a parsed source.
    #[error("Failed to parse source {id}: {message}")]
    Parse {
        /// The identifier the text was supplied under
        id: SourceIdentifier,
        /// Parser diagnostic
        message: String,
    },

    /// A provider failed for a reason other than not knowing the source.
    #[error("Provider failed to supply {id}: {message}")]
    Provider {
        /// The identifier that was requested
        id: SourceIdentifier,
        /// Provider diagnostic
        message: String,
    },
}

impl SourceError {
    /// The identifier this error concerns.
    pub fn source_id(&self) -> &SourceIdentifier {
        match self {
            SourceError::Missing { id }
            | SourceError::Parse { id, .. }
            | SourceError::Provider { id, .. } => id,
        }
    }

    /// Whether the error only says "nobody has this source".
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceError::Missing { .. })
    }
}

/// A revision string that is not a `YYYY-MM-DD` date.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid revision '{value}': expected YYYY-MM-DD")]
pub struct InvalidRevision {
    /// The rejected text
    pub value: String,
}

/// Partial result of an assembly that could not resolve every source.
///
/// `unsatisfied_imports` only lists first-order references: a source that is
/// unresolved merely because one of its dependencies is unresolved does not
/// inherit that dependency's missing references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionFailure {
    /// Sources that could be resolved, in resolution order
    pub resolved_sources: Vec<SourceIdentifier>,
    /// Sources that could not be resolved
    pub unresolved_sources: Vec<SourceIdentifier>,
    /// Missing references, keyed by the source that declares them
    pub unsatisfied_imports: BTreeMap<SourceIdentifier, BTreeSet<SourceDependency>>,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to resolve {} of {} source(s)",
            self.unresolved_sources.len(),
            self.unresolved_sources.len() + self.resolved_sources.len()
        )?;
        if !self.unsatisfied_imports.is_empty() {
            let missing = self
                .unsatisfied_imports
                .iter()
                .flat_map(|(from, deps)| deps.iter().map(move |dep| format!("{from} -> {dep}")))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " (missing: {missing})")?;
        }
        Ok(())
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// Suggestions are actionable steps, details explain what the error means.
///
/// # Examples
///
/// ```rust,no_run
/// use schema_linker::core::{ErrorContext, SchemaError};
///
/// let context = ErrorContext::new(SchemaError::NoSources)
///     .with_suggestion("Register at least one source before requesting a model")
///     .with_details("The registry assembles whatever sources are currently registered");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: SchemaError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: SchemaError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions where the
/// failure is one of ours.
///
/// Foreign errors become [`SchemaError::Other`] carrying the full context chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    let Some(schema_error) = error.downcast_ref::<SchemaError>() else {
        return ErrorContext::new(SchemaError::Other {
            message: format!("{error:#}"),
        });
    };

    let ctx = ErrorContext::new(schema_error.clone());
    match schema_error {
        SchemaError::Unresolved(failure) => {
            let missing = failure
                .unsatisfied_imports
                .values()
                .flatten()
                .map(ToString::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ");
            ctx.with_details(format!(
                "{} source(s) resolved, {} unresolved",
                failure.resolved_sources.len(),
                failure.unresolved_sources.len()
            ))
            .with_suggestion(if missing.is_empty() {
                "Check the declared imports and includes of the unresolved sources".to_string()
            } else {
                format!("Register the missing sources: {missing}")
            })
        }
        SchemaError::Structural { .. } => {
            ctx.with_suggestion("Fix the reported source content and register it again")
        }
        SchemaError::DuplicateSource(id) => ctx
            .with_details(format!("More than one source declares {id}"))
            .with_suggestion("Remove one of the duplicate sources"),
        SchemaError::Source(SourceError::Missing { id }) => {
            ctx.with_suggestion(format!("Register a source for {id} or a provider that has it"))
        }
        SchemaError::Source(SourceError::Parse { .. }) => {
            ctx.with_suggestion("Check the source text for syntax errors")
        }
        SchemaError::NoSources => {
            ctx.with_suggestion("Register at least one source before requesting a model")
        }
        _ => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Revision;

    fn id(name: &str) -> SourceIdentifier {
        SourceIdentifier::new(name)
    }

    #[test]
    fn test_resolution_failure_display_lists_missing() {
        let mut unsatisfied = BTreeMap::new();
        unsatisfied.insert(id("b"), BTreeSet::from([SourceDependency::new("c")]));
        let failure = ResolutionFailure {
            resolved_sources: vec![id("x")],
            unresolved_sources: vec![id("a"), id("b")],
            unsatisfied_imports: unsatisfied,
        };

        assert_eq!(failure.to_string(), "Failed to resolve 2 of 3 source(s) (missing: b -> c)");
    }

    #[test]
    fn test_structural_display_with_and_without_source() {
        let with = SchemaError::Structural {
            source_id: Some(SourceIdentifier::with_revision(
                "foo",
                Revision::parse("2020-01-01").unwrap(),
            )),
            message: "bad leaf".to_string(),
        };
        assert_eq!(with.to_string(), "Failed to link source foo@2020-01-01: bad leaf");

        let without = SchemaError::Structural {
            source_id: None,
            message: "bad".to_string(),
        };
        assert_eq!(without.to_string(), "Failed to link schema: bad");
    }

    #[test]
    fn test_user_friendly_error_unresolved_suggests_missing() {
        let mut unsatisfied = BTreeMap::new();
        unsatisfied.insert(id("b"), BTreeSet::from([SourceDependency::new("c")]));
        let error = SchemaError::Unresolved(ResolutionFailure {
            resolved_sources: vec![],
            unresolved_sources: vec![id("b")],
            unsatisfied_imports: unsatisfied,
        });

        let ctx = user_friendly_error(anyhow::Error::from(error));
        assert_eq!(ctx.suggestion.as_deref(), Some("Register the missing sources: c"));
        assert_eq!(ctx.details.as_deref(), Some("0 source(s) resolved, 1 unresolved"));
    }

    #[test]
    fn test_user_friendly_error_foreign_error() {
        let error = anyhow::anyhow!("disk on fire").context("loading config");
        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, SchemaError::Other { .. }));
        assert!(ctx.to_string().contains("disk on fire"));
        assert!(ctx.suggestion.is_none());
    }

    #[test]
    fn test_source_error_accessors() {
        let missing = SourceError::Missing { id: id("a") };
        assert!(missing.is_missing());
        assert_eq!(missing.source_id(), &id("a"));
        assert_eq!(SchemaError::from(missing).source_id(), Some(&id("a")));
    }
}
