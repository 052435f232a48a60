//! # leadflow-core
//!
//! Core types, configuration, and error handling for the Leadflow
//! customer-engagement backend: the product catalog and conversation
//! domain models, the conversation lifecycle state machine, webhook
//! event types, and the traits implemented by AI collaborators.

pub mod config;
pub mod conversation;
pub mod engage;
pub mod error;
pub mod event;
pub mod product;
pub mod traits;
