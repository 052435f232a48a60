//! The message-processing pipeline, run once per inbound event.
//!
//! Resolve conversation -> persist customer message -> extract keywords
//! -> correlate against the catalog -> decide branch -> generate reply
//! -> persist assistant message. Collaborator failures after retries
//! leave the conversation state intact; the event may be redelivered.

use super::Gateway;
use leadflow_core::conversation::{Message, MessageRole};
use leadflow_core::engage::{
    BranchDecision, BranchType, ExtractionRequest, GenerationRequest, IngestOutcome,
};
use leadflow_core::error::LeadflowError;
use leadflow_core::event::InboundEvent;
use leadflow_core::product::normalize_tags;
use leadflow_match::{decide_branch, match_products};
use leadflow_memory::ProductFilter;
use leadflow_providers::with_retry;
use tracing::debug;
use uuid::Uuid;

impl Gateway {
    /// Process one inbound event end to end.
    pub async fn ingest_message(
        &self,
        event: InboundEvent,
    ) -> Result<IngestOutcome, LeadflowError> {
        let content = event
            .message
            .content()
            .ok_or_else(|| LeadflowError::Validation("event carries no processable text".into()))?
            .to_string();

        let conversation = self
            .store
            .get_or_create_conversation(
                &event.customer_id,
                event.customer_name.as_deref(),
                event.customer_username.as_deref(),
                event.platform,
                &event.platform_conversation_id,
            )
            .await?;

        // History snapshot taken before the append so the generation
        // prompt carries the current message only once, as
        // `customer_message`.
        let history = self
            .store
            .recent_history(&conversation.id, self.max_context_messages)
            .await?;

        let mut customer_message =
            Message::text(&event.message.id, MessageRole::Customer, &content);
        customer_message.timestamp = event.message.timestamp;
        self.store
            .append_message(
                &conversation.id,
                &customer_message,
                self.engagement.max_persistence_attempts,
            )
            .await?;

        // Context for extraction: the messages that preceded this one.
        let context: Vec<String> = conversation
            .messages
            .iter()
            .rev()
            .take(self.max_context_messages)
            .rev()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect();

        let extraction_request = ExtractionRequest {
            message_text: content.clone(),
            conversation_context: context,
            customer_id: event.customer_id.clone(),
            platform: event.platform.to_string(),
        };
        let extraction = with_retry(
            self.extractor.name(),
            self.call_budget,
            self.call_attempts,
            || self.extractor.extract(&extraction_request),
        )
        .await?;
        let keywords = normalize_tags(&extraction.keywords);
        debug!(
            "extracted {} keyword(s) for conversation {}",
            keywords.len(),
            conversation.id
        );

        let catalog = self
            .store
            .list_active_products(&ProductFilter::default())
            .await?;
        let matches = match_products(
            &keywords,
            &catalog,
            self.engagement.correlation_threshold,
            self.engagement.max_matches,
        )?;

        let direct = event.message.direct_product_reference();
        let decision = decide_branch(&conversation, direct, &matches);
        self.store.set_branch(&conversation.id, &decision).await?;

        let matched_ids: Vec<i64> = matches.iter().map(|m| m.product_id).collect();
        let best_score = matches.first().map(|m| m.correlation_score);
        self.store
            .record_message_analysis(
                &conversation.id,
                &customer_message.id,
                &keywords,
                &matched_ids,
                best_score,
            )
            .await?;

        let generation_request = GenerationRequest {
            customer_message: content,
            history,
            matched_products: matches.clone(),
            conversation_goal: conversation_goal(&decision),
        };
        let reply = with_retry(
            self.generator.name(),
            self.call_budget,
            self.call_attempts,
            || self.generator.generate(&generation_request),
        )
        .await?;

        let mut assistant_message = Message::text(
            format!("reply-{}", Uuid::new_v4()),
            MessageRole::Assistant,
            &reply.response_text,
        );
        assistant_message.matched_products = reply.products_mentioned.clone();
        assistant_message.correlation_score = reply.confidence_score;
        self.store
            .append_message(
                &conversation.id,
                &assistant_message,
                self.engagement.max_persistence_attempts,
            )
            .await?;

        Ok(IngestOutcome {
            conversation_id: conversation.id,
            branch_decision: decision,
            matches,
            new_state: conversation.state,
            response_text: Some(reply.response_text),
        })
    }
}

/// Derive the generation objective from the branch decision.
fn conversation_goal(decision: &BranchDecision) -> String {
    match (decision.branch_type, decision.target_product_id) {
        (BranchType::Manipulator, Some(id)) => {
            format!("present product {id} directly and move toward qualification")
        }
        (BranchType::Manipulator, None) => {
            "present the referenced product directly".to_string()
        }
        (BranchType::Convincer, _) => {
            "build interest from the customer's stated preferences".to_string()
        }
    }
}
