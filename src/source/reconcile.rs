//! Reconciliation of requested identifiers against what the content declares.
//!
//! Callers name sources by the identifier they believe in; the parser reports
//! the identifier the text actually declares. The actual identifier always
//! wins. Discrepancies are logged, never treated as failures.

use std::collections::HashMap;

use super::{ParsedSource, SourceIdentifier};
use crate::constants::targets;

/// How a requested identifier relates to the identifier the content declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierMismatch {
    /// Both are the same.
    Exact,
    /// The caller omitted the revision and the content supplied it.
    Expanded,
    /// The caller specified a revision the content does not declare.
    RevisionCorrected,
    /// The names differ.
    NameCorrected,
}

/// Compare `requested` with `actual` and log the discrepancy at the matching level.
pub fn check_identifier(
    requested: &SourceIdentifier,
    actual: &SourceIdentifier,
) -> IdentifierMismatch {
    if requested == actual {
        return IdentifierMismatch::Exact;
    }

    if requested.name() != actual.name() {
        tracing::info!(
            target: targets::SOURCE,
            "Provided module name {} does not match actual text {}, corrected",
            requested.to_file_name(),
            actual.to_file_name()
        );
        return IdentifierMismatch::NameCorrected;
    }

    if requested.revision().is_some() {
        tracing::info!(
            target: targets::SOURCE,
            "Provided module revision {} does not match actual text {}, corrected",
            requested.to_file_name(),
            actual.to_file_name()
        );
        IdentifierMismatch::RevisionCorrected
    } else {
        tracing::debug!(
            target: targets::SOURCE,
            "Expanded module {} to {}",
            requested.to_file_name(),
            actual.to_file_name()
        );
        IdentifierMismatch::Expanded
    }
}

/// Reconcile fetched sources against the identifiers they were requested under.
///
/// `requested[i]` is the identifier used to fetch `parsed[i]`. Each pair is
/// checked with [`check_identifier`]. The result is keyed by the actual
/// identifier, in first-seen order; when two sources declare the same
/// identifier the later one replaces the earlier in place and a warning is
/// logged.
pub fn reconcile(requested: &[SourceIdentifier], parsed: Vec<ParsedSource>) -> Vec<ParsedSource> {
    let mut result: Vec<ParsedSource> = Vec::with_capacity(parsed.len());
    let mut positions: HashMap<SourceIdentifier, usize> = HashMap::with_capacity(parsed.len());

    for (index, source) in parsed.into_iter().enumerate() {
        if let Some(requested_id) = requested.get(index) {
            check_identifier(requested_id, source.id());
        }

        match positions.get(source.id()) {
            Some(&position) => {
                tracing::warn!(
                    target: targets::SOURCE,
                    "Duplicate source {} encountered, keeping the later one",
                    source.id()
                );
                result[position] = source;
            }
            None => {
                positions.insert(source.id().clone(), result.len());
                result.push(source);
            }
        }
    }

    result
}
