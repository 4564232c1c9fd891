// ABOUTME: External web search and a memoising cache in front of it
// ABOUTME: Identical queries share one outbound call; entries expire and the table is size-bounded

pub mod cache;
pub mod client;

pub use cache::{SearchCache, DEFAULT_MAX_ENTRIES};
pub use client::{BraveSearchClient, SearchBackend, SearchError};
