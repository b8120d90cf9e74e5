//! Engine error types.
//!
//! Only two things fail a request: a query that does not parse or validate,
//! and an entry point whose registry cannot be read. Everything below the
//! entry point degrades to `null` at the affected field.

use mfe_sources::SourceError;
use thiserror::Error;

/// Failure class, for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Query document rejected before any fetch.
    QueryFailure,
    /// Registry unreachable, unparseable or malformed. Fatal.
    EntryResolutionFailure,
    /// One build list or one metadata document unavailable. Field-scoped.
    SubtreeFetchFailure,
    /// Requested app key not in the registry. Not an error.
    LookupMiss,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryFailure => "QUERY_FAILURE",
            Self::EntryResolutionFailure => "ENTRY_RESOLUTION_FAILURE",
            Self::SubtreeFetchFailure => "SUBTREE_FETCH_FAILURE",
            Self::LookupMiss => "LOOKUP_MISS",
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, Self::QueryFailure | Self::EntryResolutionFailure)
    }
}

/// Rejected query document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid query document: {0}")]
    Syntax(String),

    #[error("unsupported in this gateway: {0}")]
    Unsupported(String),

    #[error("no operation named `{0}`")]
    UnknownOperation(String),

    #[error("document defines several operations; an operation name is required")]
    AmbiguousOperation,

    #[error("field `{field}` does not exist on `{type_name}`")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    #[error("field `{field}` on `{type_name}` is a scalar and cannot have a selection")]
    UnexpectedSelection {
        type_name: &'static str,
        field: String,
    },

    #[error("field `{field}` on `{type_name}` must have a selection")]
    MissingSelection {
        type_name: &'static str,
        field: String,
    },

    #[error("field `{field}` requires argument `{argument}`")]
    MissingArgument {
        field: String,
        argument: &'static str,
    },

    #[error("field `{field}` does not accept argument `{argument}`")]
    UnknownArgument { field: String, argument: String },

    #[error("argument `{argument}` of `{field}` must be a string")]
    InvalidArgument {
        field: String,
        argument: &'static str,
    },

    #[error("selections for `{output}` on `{type_name}` differ in field or arguments")]
    ConflictingFields {
        type_name: &'static str,
        output: String,
    },

    #[error("variable `${0}` is not defined")]
    UndefinedVariable(String),

    #[error("variable `${name}` must be a string")]
    InvalidVariable { name: String },

    #[error("variable `${0}` is required")]
    MissingVariable(String),
}

/// Request-level failure.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("app registry unavailable: {0}")]
    EntryResolution(#[source] SourceError),
}

impl ResolveError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Query(_) => ErrorCategory::QueryFailure,
            Self::EntryResolution(_) => ErrorCategory::EntryResolutionFailure,
        }
    }
}
