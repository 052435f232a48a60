//! Conversation aggregate: per-customer thread with embedded message
//! history, lead-qualification assessment, and the lifecycle state
//! machine governing valid transitions.

use crate::error::LeadflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported social media platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    WhatsApp,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::WhatsApp => "whatsapp",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "whatsapp" => Ok(Self::WhatsApp),
            "telegram" => Ok(Self::Telegram),
            other => Err(LeadflowError::Validation(format!(
                "unknown platform: {other}"
            ))),
        }
    }
}

/// Conversation lifecycle states.
///
/// `Active` is the initial state. `Abandoned`, `Completed`, and `Failed`
/// are terminal: no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Active,
    Qualified,
    Abandoned,
    Completed,
    Failed,
}

impl ConversationState {
    pub const ALL: [ConversationState; 5] = [
        Self::Active,
        Self::Qualified,
        Self::Abandoned,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Qualified => "qualified",
            Self::Abandoned => "abandoned",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states accept no further mutation, only reads.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Abandoned | Self::Completed | Self::Failed)
    }

    /// The full transition table.
    ///
    /// Active -> Qualified | Abandoned | Failed
    /// Qualified -> Completed | Abandoned | Failed
    pub fn can_transition(self, to: ConversationState) -> bool {
        use ConversationState::*;
        match (self, to) {
            (Active, Qualified) | (Active, Abandoned) | (Active, Failed) => true,
            (Qualified, Completed) | (Qualified, Abandoned) | (Qualified, Failed) => true,
            (Active, _) | (Qualified, _) => false,
            (Abandoned, _) | (Completed, _) | (Failed, _) => false,
        }
    }

    /// Validate a transition, returning the new state or
    /// `InvalidTransition` with the state unchanged.
    pub fn transition(self, to: ConversationState) -> Result<ConversationState, LeadflowError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(LeadflowError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationState {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "qualified" => Ok(Self::Qualified),
            "abandoned" => Ok(Self::Abandoned),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(LeadflowError::Validation(format!(
                "unknown conversation state: {other}"
            ))),
        }
    }
}

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Customer,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(LeadflowError::Validation(format!(
                "unknown message role: {other}"
            ))),
        }
    }
}

/// Type of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
    Sticker,
    Reaction,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Sticker => "sticker",
            Self::Reaction => "reaction",
        }
    }
}

impl FromStr for MessageType {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "file" => Ok(Self::File),
            "sticker" => Ok(Self::Sticker),
            "reaction" => Ok(Self::Reaction),
            other => Err(LeadflowError::Validation(format!(
                "unknown message type: {other}"
            ))),
        }
    }
}

/// A single message within a conversation. Owned exclusively by its
/// parent conversation; appended in arrival order and never mutated,
/// except for analysis enrichment after keyword extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Platform-supplied message ID.
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    /// Keywords extracted by the AI collaborator, normalized.
    #[serde(default)]
    pub extracted_keywords: Vec<String>,
    /// Product IDs matched by the correlation engine.
    #[serde(default)]
    pub matched_products: Vec<i64>,
    /// Best correlation score for this message, 0..=1.
    #[serde(default)]
    pub correlation_score: Option<f64>,
}

impl Message {
    /// A plain inbound/outbound text message with no analysis attached.
    pub fn text(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            extracted_keywords: Vec::new(),
            matched_products: Vec::new(),
            correlation_score: None,
        }
    }
}

/// Assessed urgency of a qualified lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

/// Lead qualification assessment. Recomputed and replaced wholesale,
/// never partially mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadQualification {
    pub is_qualified: bool,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub qualification_reasons: Vec<String>,
    /// Product IDs the customer showed interest in.
    #[serde(default)]
    pub interested_products: Vec<i64>,
    /// Customer statements indicating budget or buying intent.
    #[serde(default)]
    pub budget_indicators: Vec<String>,
    #[serde(default)]
    pub urgency_level: Option<UrgencyLevel>,
    /// Recommended next actions for the onboarding handoff.
    #[serde(default)]
    pub next_actions: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

/// A customer conversation thread on one platform.
///
/// Invariants enforced by the store:
/// - `target_product_id` is set only when `branch_type` is manipulator
/// - `qualified_at` is set exactly when the state becomes Qualified
/// - messages are append-only, ordered by arrival
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_username: Option<String>,
    pub platform: Platform,
    pub platform_conversation_id: String,
    pub state: ConversationState,
    /// "manipulator" or "convincer"; None until the first decision.
    pub branch_type: Option<crate::engage::BranchType>,
    pub target_product_id: Option<i64>,
    pub messages: Vec<Message>,
    pub lead_qualification: Option<LeadQualification>,
    pub total_messages: i64,
    pub ai_response_count: i64,
    /// Final conversation outcome (handoff, abandonment, failure reason).
    pub outcome: Option<String>,
    /// Data package recorded for the onboarding handoff.
    pub handoff_data: Option<serde_json::Value>,
    /// Optimistic-concurrency version, bumped on every write.
    pub version: i64,
    pub started_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub qualified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_transitions() {
        use ConversationState::*;
        assert!(Active.can_transition(Qualified));
        assert!(Active.can_transition(Abandoned));
        assert!(Active.can_transition(Failed));
        assert!(!Active.can_transition(Completed));
        assert!(!Active.can_transition(Active));
    }

    #[test]
    fn test_qualified_transitions() {
        use ConversationState::*;
        assert!(Qualified.can_transition(Completed));
        assert!(Qualified.can_transition(Abandoned));
        assert!(Qualified.can_transition(Failed));
        assert!(!Qualified.can_transition(Active));
        assert!(!Qualified.can_transition(Qualified));
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        use ConversationState::*;
        for from in [Abandoned, Completed, Failed] {
            assert!(from.is_terminal());
            for to in ConversationState::ALL {
                assert!(!from.can_transition(to), "{from} -> {to} must be invalid");
                match from.transition(to) {
                    Err(LeadflowError::InvalidTransition { from: f, to: t }) => {
                        assert_eq!(f, from);
                        assert_eq!(t, to);
                    }
                    other => panic!("expected InvalidTransition, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in ConversationState::ALL {
            assert_eq!(state.as_str().parse::<ConversationState>().unwrap(), state);
        }
        assert!("closed".parse::<ConversationState>().is_err());
    }

    #[test]
    fn test_platform_round_trips_through_str() {
        for p in [
            Platform::Facebook,
            Platform::Instagram,
            Platform::WhatsApp,
            Platform::Telegram,
        ] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn test_message_serde_defaults() {
        // Stored messages written before analysis enrichment still load.
        let json = r#"{"id":"m1","role":"customer","content":"hi","timestamp":"2026-01-01T00:00:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message_type, MessageType::Text);
        assert!(msg.extracted_keywords.is_empty());
        assert!(msg.correlation_score.is_none());
    }
}
