//! # leadflow-providers
//!
//! AI collaborator implementations: keyword extraction and response
//! generation over an OpenAI-compatible chat endpoint, plus the
//! bounded-timeout retry helper used for every external call.

pub mod openai;
pub mod retry;

pub use openai::{OpenAiExtractor, OpenAiGenerator};
pub use retry::with_retry;
