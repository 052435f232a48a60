//! # leadflow-memory
//!
//! SQLite-backed persistence for Leadflow: the product catalog and the
//! conversation store with per-conversation optimistic concurrency.

pub mod store;

pub use store::{ConversationStats, ProductFilter, Store};
