use crate::conversation::ConversationState;
use thiserror::Error;

/// Top-level error type for Leadflow.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Malformed input data, rejected before persistence.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced product or conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conversation lifecycle rule violation. The stored state is unchanged.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ConversationState,
        to: ConversationState,
    },

    /// Correlation threshold outside [0, 1].
    #[error("invalid correlation threshold: {0}")]
    InvalidThreshold(f64),

    /// Correlation max_results must be positive.
    #[error("invalid max_results: {0}")]
    InvalidMaxResults(i64),

    /// Optimistic-lock retry budget exhausted on a conversation write.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// An external AI collaborator exceeded its timeout budget.
    /// Recoverable: the conversation remains in its prior state and the
    /// inbound event may be retried by the caller.
    #[error("upstream timeout: {service} exceeded {budget_ms}ms budget")]
    UpstreamTimeout { service: String, budget_ms: u64 },

    /// Error from an AI collaborator (extraction or generation).
    #[error("provider error: {0}")]
    Provider(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeadflowError {
    /// Whether the caller may safely retry the operation that produced
    /// this error. Only upstream timeouts and exhausted optimistic-lock
    /// retries qualify; validation and lifecycle errors never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::ConcurrencyConflict(_)
        )
    }
}
