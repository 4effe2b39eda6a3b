//! Core search subsystem for a workspace search engine: multi-backend file
//! walking, streamed grep-backed text search, fuzzy ranking, and prefix
//! caching (spec §1–§2, components C1–C8).
//!
//! Consumers construct a [`search::SearchService`] with an [`config::EngineConfig`]
//! and drive it with a [`query::SearchQuery`], reading [`search::StreamItem`]s off
//! the returned channel until the terminal item arrives.

pub mod config;
pub mod directory_tree;
pub mod error;
pub mod glob_matcher;
pub mod grep;
pub mod query;
pub mod result;
pub mod search;
pub mod walker;

pub use error::SearchError;
pub use query::{ContentPattern, FolderQuery, GlobExpr, GlobRule, PreviewOptions, SearchQuery};
pub use result::{InfoItem, MatchItem, SearchStats, Terminal, TerminalError};
pub use search::{CancelHandle, SearchService, StreamItem};
