//! Typed error model for the search subsystem
//!
//! This mirrors the teacher's habit of small plain enums (`SearchResultType`,
//! `SortBy`) rather than a single opaque `anyhow::Error`: callers above this
//! crate need to tell "the pattern was bad" apart from "the grep binary
//! crashed" apart from "the request was cancelled", so each gets its own
//! variant instead of a string.

use std::fmt;

/// The five error kinds a search can terminate with.
#[derive(Debug, Clone)]
pub enum SearchError {
    /// The request itself is malformed or refers to something that cannot
    /// exist: a bad glob, an unreadable root, an unsupported encoding name.
    /// Surfaced to the caller immediately; never retried.
    UserFatal { message: String },

    /// A transient condition: a file vanished mid-walk, a permission was
    /// denied on one subtree, a single read failed. Recorded against the
    /// search's error list but does not stop the search.
    Transient { path: Option<String>, message: String },

    /// The request was cancelled by its own cancellation token, not by a
    /// failure. Carries no message beyond which row asked.
    Cancelled,

    /// The child grep process crashed, was killed by a signal, or exited
    /// with a code outside the {0, 1} success contract.
    ChildCrash { message: String, stack: Option<String> },

    /// An internal invariant was violated: a state machine saw an event it
    /// should be impossible to reach. These indicate bugs in this crate, not
    /// in the input or environment.
    Internal { message: String },
}

impl SearchError {
    pub fn user_fatal(message: impl Into<String>) -> Self {
        Self::UserFatal { message: message.into() }
    }

    pub fn transient(path: Option<String>, message: impl Into<String>) -> Self {
        Self::Transient { path, message: message.into() }
    }

    pub fn child_crash(message: impl Into<String>) -> Self {
        Self::ChildCrash { message: message.into(), stack: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error should stop the whole search rather than just be
    /// recorded against it and continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Transient { .. })
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserFatal { message } => write!(f, "invalid search request: {message}"),
            Self::Transient { path: Some(path), message } => {
                write!(f, "{path}: {message}")
            }
            Self::Transient { path: None, message } => write!(f, "{message}"),
            Self::Cancelled => write!(f, "search cancelled"),
            Self::ChildCrash { message, .. } => write!(f, "grep process failed: {message}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        Self::Transient { path: None, message: err.to_string() }
    }
}
