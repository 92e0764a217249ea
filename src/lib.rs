// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod archive;
pub mod config;
pub mod pipeline;
pub mod rank;
pub mod select;
pub mod sources;
pub mod store;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::store::{MergeOutcome, MergeParams, MergeStore, Record};
pub use crate::summarize::{ChainError, ModelChain, ProviderFailure, TextProvider};
