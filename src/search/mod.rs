//! Batching, ranking, cache and dispatch layer sitting above the walker
//! (C3) and grep driver (C5): the Batched Collector (C6), Scoring & Cache
//! (C7), and Search Service (C8) of spec §4.6–§4.8.

pub mod cache;
pub mod collector;
pub mod scoring;
pub mod service;

pub use service::{CancelHandle, SearchService, StreamItem};
