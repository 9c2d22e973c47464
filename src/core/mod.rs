//! Core types shared by every layer: errors and their presentation.

pub mod error;

pub use error::{
    ErrorContext, InvalidRevision, ResolutionFailure, SchemaError, SourceError,
    user_friendly_error,
};
