//! Engagement pipeline data types: correlation matches, branch
//! decisions, and the request/response contracts of the AI
//! collaborators (keyword extraction and response generation).

use crate::conversation::ConversationState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One of the two conversational strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    /// Direct product push: a target product is already known.
    Manipulator,
    /// Keyword-driven persuasion: product selection deferred to the
    /// correlation engine.
    Convincer,
}

impl BranchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manipulator => "manipulator",
            Self::Convincer => "convincer",
        }
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BranchType {
    type Err = crate::error::LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manipulator" => Ok(Self::Manipulator),
            "convincer" => Ok(Self::Convincer),
            other => Err(crate::error::LeadflowError::Validation(format!(
                "unknown branch type: {other}"
            ))),
        }
    }
}

/// A product scored against the customer's extracted keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product_id: i64,
    /// Fraction of the product's tags covered by the keywords, 0..=1.
    pub correlation_score: f64,
    /// The tags that matched.
    pub matching_tags: Vec<String>,
    pub product_name: String,
    pub product_genre: Option<String>,
}

/// Outcome of the branch decision, re-evaluated on every inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDecision {
    pub branch_type: BranchType,
    /// Decision confidence, 0..=1.
    pub confidence: f64,
    /// Human-readable reasoning for logs and analytics.
    pub reasoning: String,
    /// Set only for the manipulator branch.
    pub target_product_id: Option<i64>,
}

/// Request to the keyword-extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub message_text: String,
    /// Previous messages for context, oldest first.
    #[serde(default)]
    pub conversation_context: Vec<String>,
    pub customer_id: String,
    pub platform: String,
}

/// Keywords extracted from a customer message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub keywords: Vec<String>,
    /// Per-keyword confidence, 0..=1.
    #[serde(default)]
    pub confidence_scores: HashMap<String, f64>,
}

/// A conversation history entry passed to the response generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// "customer" or "assistant".
    pub role: String,
    pub content: String,
}

/// Request to the response-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub customer_message: String,
    /// Conversation history, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Products the reply may mention.
    pub matched_products: Vec<ProductMatch>,
    /// Current conversation objective, derived from the branch decision.
    pub conversation_goal: String,
}

/// Reply produced by the response generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub response_text: String,
    /// Response quality confidence, 0..=1.
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Product IDs the reply mentions.
    #[serde(default)]
    pub products_mentioned: Vec<i64>,
    /// State the generator suggests moving to. Advisory only; lifecycle
    /// transitions are always validated by the state machine.
    #[serde(default)]
    pub suggested_state: Option<ConversationState>,
}

/// Result of ingesting one inbound webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub conversation_id: String,
    pub branch_decision: BranchDecision,
    pub matches: Vec<ProductMatch>,
    pub new_state: ConversationState,
    /// The generated reply text, when generation ran.
    pub response_text: Option<String>,
}
