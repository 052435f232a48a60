use crate::engage::{ExtractionRequest, ExtractionResult, GeneratedReply, GenerationRequest};
use crate::error::LeadflowError;
use async_trait::async_trait;

/// Keyword-extraction collaborator.
///
/// Pulls product-relevant keywords out of a customer message so the
/// correlation engine can score the catalog against them. The actual
/// NLP is external; implementations are thin clients.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Human-readable collaborator name, used in logs and timeout errors.
    fn name(&self) -> &str;

    /// Extract keywords from one customer message.
    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionResult, LeadflowError>;

    /// Whether the collaborator is configured and ready.
    async fn is_available(&self) -> bool;
}

/// Response-generation collaborator.
///
/// Produces the assistant reply for the current branch strategy given
/// the conversation history and matched products.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Human-readable collaborator name, used in logs and timeout errors.
    fn name(&self) -> &str;

    /// Generate a reply to the customer's latest message.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedReply, LeadflowError>;

    /// Whether the collaborator is configured and ready.
    async fn is_available(&self) -> bool;
}
