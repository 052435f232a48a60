//! Two-branch strategy decision.
//!
//! Re-evaluated on every inbound message because customer intent can
//! shift mid-conversation. A manipulator binding is sticky: once a
//! target product is bound, re-evaluation returns it unchanged; only
//! qualification or an explicit reset clears it.

use leadflow_core::conversation::Conversation;
use leadflow_core::engage::{BranchDecision, BranchType, ProductMatch};

/// Decide the conversational strategy for the current message.
///
/// `direct_reference` is a product id named explicitly by the customer
/// (e.g. a product postback payload); it binds the manipulator branch.
pub fn decide_branch(
    conversation: &Conversation,
    direct_reference: Option<i64>,
    matches: &[ProductMatch],
) -> BranchDecision {
    // Sticky: an existing manipulator binding wins over everything.
    if conversation.branch_type == Some(BranchType::Manipulator) {
        if let Some(target) = conversation.target_product_id {
            return BranchDecision {
                branch_type: BranchType::Manipulator,
                confidence: 1.0,
                reasoning: format!("existing manipulator binding to product {target}"),
                target_product_id: Some(target),
            };
        }
    }

    if let Some(target) = direct_reference.or(conversation.target_product_id) {
        return BranchDecision {
            branch_type: BranchType::Manipulator,
            confidence: 1.0,
            reasoning: "direct product reference present".to_string(),
            target_product_id: Some(target),
        };
    }

    let reasoning = match matches.first() {
        Some(top) => format!(
            "keyword-driven correlation: top score {:.2} (product {})",
            top.correlation_score, top.product_id
        ),
        None => "keyword-driven correlation: no product cleared the threshold".to_string(),
    };
    BranchDecision {
        branch_type: BranchType::Convincer,
        confidence: matches.first().map_or(0.0, |m| m.correlation_score),
        reasoning,
        target_product_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadflow_core::conversation::{ConversationState, Platform};

    fn conversation() -> Conversation {
        Conversation {
            id: "conv-1".into(),
            customer_id: "c1".into(),
            customer_name: None,
            customer_username: None,
            platform: Platform::Facebook,
            platform_conversation_id: "t1".into(),
            state: ConversationState::Active,
            branch_type: None,
            target_product_id: None,
            messages: Vec::new(),
            lead_qualification: None,
            total_messages: 0,
            ai_response_count: 0,
            outcome: None,
            handoff_data: None,
            version: 0,
            started_at: Utc::now(),
            last_message_at: None,
            qualified_at: None,
            completed_at: None,
        }
    }

    fn product_match(id: i64, score: f64) -> ProductMatch {
        ProductMatch {
            product_id: id,
            correlation_score: score,
            matching_tags: vec!["a".into()],
            product_name: format!("product-{id}"),
            product_genre: None,
        }
    }

    #[test]
    fn test_direct_reference_binds_manipulator() {
        let decision = decide_branch(&conversation(), Some(42), &[]);
        assert_eq!(decision.branch_type, BranchType::Manipulator);
        assert_eq!(decision.target_product_id, Some(42));
        assert_eq!(decision.confidence, 1.0);
        assert!(decision.reasoning.contains("direct product reference"));
    }

    #[test]
    fn test_no_reference_chooses_convincer() {
        let matches = [product_match(7, 0.83)];
        let decision = decide_branch(&conversation(), None, &matches);
        assert_eq!(decision.branch_type, BranchType::Convincer);
        assert!(decision.target_product_id.is_none());
        assert_eq!(decision.confidence, 0.83);
        assert!(decision.reasoning.contains("0.83"));
    }

    #[test]
    fn test_convincer_with_no_matches_has_zero_confidence() {
        let decision = decide_branch(&conversation(), None, &[]);
        assert_eq!(decision.branch_type, BranchType::Convincer);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_manipulator_binding_is_sticky() {
        let mut conv = conversation();
        conv.branch_type = Some(BranchType::Manipulator);
        conv.target_product_id = Some(5);
        // A later direct reference to a different product must not
        // overwrite the bound target.
        let decision = decide_branch(&conv, Some(99), &[product_match(3, 0.9)]);
        assert_eq!(decision.branch_type, BranchType::Manipulator);
        assert_eq!(decision.target_product_id, Some(5));
    }

    #[test]
    fn test_target_on_conversation_without_branch_binds_manipulator() {
        // Target set at conversation creation, before any decision ran.
        let mut conv = conversation();
        conv.target_product_id = Some(11);
        let decision = decide_branch(&conv, None, &[]);
        assert_eq!(decision.branch_type, BranchType::Manipulator);
        assert_eq!(decision.target_product_id, Some(11));
    }
}
