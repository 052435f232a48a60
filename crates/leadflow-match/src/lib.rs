//! # leadflow-match
//!
//! Pure, stateless engagement logic: the tag-overlap correlation engine
//! and the two-branch strategy decision. Safe to call concurrently
//! across conversations without coordination.

pub mod branch;
pub mod correlate;

pub use branch::decide_branch;
pub use correlate::match_products;
