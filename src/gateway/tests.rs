use super::Gateway;
use async_trait::async_trait;
use chrono::Utc;
use leadflow_core::config::Config;
use leadflow_core::conversation::{ConversationState, MessageRole, Platform};
use leadflow_core::engage::{
    BranchType, ExtractionRequest, ExtractionResult, GeneratedReply, GenerationRequest,
};
use leadflow_core::error::LeadflowError;
use leadflow_core::event::{InboundEvent, InboundMessage};
use leadflow_core::product::NewProduct;
use leadflow_core::traits::{KeywordExtractor, ResponseGenerator};
use leadflow_memory::Store;
use std::collections::HashMap;
use std::sync::Arc;

struct FixedExtractor {
    keywords: Vec<String>,
}

#[async_trait]
impl KeywordExtractor for FixedExtractor {
    fn name(&self) -> &str {
        "fixed-extractor"
    }

    async fn extract(&self, _: &ExtractionRequest) -> Result<ExtractionResult, LeadflowError> {
        Ok(ExtractionResult {
            keywords: self.keywords.clone(),
            confidence_scores: HashMap::new(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct FixedGenerator {
    reply: String,
}

#[async_trait]
impl ResponseGenerator for FixedGenerator {
    fn name(&self) -> &str {
        "fixed-generator"
    }

    async fn generate(&self, _: &GenerationRequest) -> Result<GeneratedReply, LeadflowError> {
        Ok(GeneratedReply {
            response_text: self.reply.clone(),
            confidence_score: Some(0.9),
            products_mentioned: Vec::new(),
            suggested_state: None,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Captures the history passed to each `generate` call.
#[derive(Clone, Default)]
struct RecordingGenerator {
    histories: Arc<std::sync::Mutex<Vec<Vec<leadflow_core::engage::HistoryEntry>>>>,
}

#[async_trait]
impl ResponseGenerator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording-generator"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, LeadflowError> {
        self.histories.lock().unwrap().push(request.history.clone());
        Ok(GeneratedReply {
            response_text: "noted".to_string(),
            confidence_score: None,
            products_mentioned: Vec::new(),
            suggested_state: None,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct FailingGenerator;

#[async_trait]
impl ResponseGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing-generator"
    }

    async fn generate(&self, _: &GenerationRequest) -> Result<GeneratedReply, LeadflowError> {
        Err(LeadflowError::Provider("upstream is down".into()))
    }

    async fn is_available(&self) -> bool {
        false
    }
}

async fn seeded_store() -> Store {
    let store = Store::open_in_memory().await.unwrap();
    for (name, genre, tags) in [
        ("Dune", "sci-fi", vec!["sci-fi", "paperback", "classic"]),
        ("The Hobbit", "fantasy", vec!["fantasy", "paperback"]),
        ("Cookbook", "cooking", vec!["recipes"]),
    ] {
        store
            .create_product(NewProduct {
                name: name.to_string(),
                description: None,
                price: Some(9.99),
                currency: "USD".to_string(),
                genre: Some(genre.to_string()),
                tags: tags.into_iter().map(String::from).collect(),
                is_active: true,
                external_id: None,
            })
            .await
            .unwrap();
    }
    store
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.engagement.correlation_threshold = 0.5;
    config.provider.timeout_secs = 2;
    config.provider.max_retries = 1;
    config
}

fn gateway(
    store: Store,
    extractor: impl KeywordExtractor + 'static,
    generator: impl ResponseGenerator + 'static,
) -> Gateway {
    Gateway::new(store, Arc::new(extractor), Arc::new(generator), &test_config())
}

fn text_event(customer: &str, message_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        customer_id: customer.to_string(),
        customer_name: Some("Ana".to_string()),
        customer_username: None,
        platform: Platform::Facebook,
        platform_conversation_id: format!("thread-{customer}"),
        message: InboundMessage {
            id: message_id.to_string(),
            text: Some(text.to_string()),
            timestamp: Utc::now(),
            attachments: None,
            quick_reply: None,
            postback: None,
        },
    }
}

fn postback_event(customer: &str, message_id: &str, payload: &str) -> InboundEvent {
    let mut event = text_event(customer, message_id, "");
    event.message.text = None;
    event.message.postback = Some(HashMap::from([
        ("payload".to_string(), payload.to_string()),
        ("title".to_string(), "View".to_string()),
    ]));
    event
}

#[tokio::test]
async fn test_ingest_full_flow_convincer() {
    let store = seeded_store().await;
    let gw = gateway(
        store.clone(),
        FixedExtractor {
            keywords: vec!["Sci-Fi".to_string(), "paperback".to_string()],
        },
        FixedGenerator {
            reply: "You might love Dune!".to_string(),
        },
    );

    let outcome = gw
        .ingest_message(text_event("c1", "m1", "looking for a sci-fi paperback"))
        .await
        .unwrap();

    assert_eq!(outcome.branch_decision.branch_type, BranchType::Convincer);
    assert!(outcome.branch_decision.target_product_id.is_none());
    // Dune scores 2/3, The Hobbit exactly 0.5 (inclusive threshold),
    // the cookbook matches nothing.
    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.matches[0].product_name, "Dune");
    assert_eq!(outcome.matches[1].product_name, "The Hobbit");
    assert_eq!(outcome.new_state, ConversationState::Active);
    assert_eq!(outcome.response_text.as_deref(), Some("You might love Dune!"));

    let conversation = store.get_conversation(&outcome.conversation_id).await.unwrap();
    assert_eq!(conversation.total_messages, 2);
    assert_eq!(conversation.ai_response_count, 1);
    assert_eq!(conversation.messages[0].role, MessageRole::Customer);
    // Keyword analysis is recorded on the customer message, normalized.
    assert_eq!(conversation.messages[0].extracted_keywords, vec!["sci-fi", "paperback"]);
    assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
    assert_eq!(conversation.messages[1].content, "You might love Dune!");
}

#[tokio::test]
async fn test_direct_reference_binds_manipulator_and_sticks() {
    let store = seeded_store().await;
    let gw = gateway(
        store.clone(),
        FixedExtractor { keywords: vec![] },
        FixedGenerator {
            reply: "Here it is.".to_string(),
        },
    );

    let outcome = gw
        .ingest_message(postback_event("c2", "m1", "product:1"))
        .await
        .unwrap();
    assert_eq!(outcome.branch_decision.branch_type, BranchType::Manipulator);
    assert_eq!(outcome.branch_decision.target_product_id, Some(1));

    // The next plain-text message keeps the binding.
    let outcome = gw
        .ingest_message(text_event("c2", "m2", "tell me more"))
        .await
        .unwrap();
    assert_eq!(outcome.branch_decision.branch_type, BranchType::Manipulator);
    assert_eq!(outcome.branch_decision.target_product_id, Some(1));

    let conversation = store.get_conversation(&outcome.conversation_id).await.unwrap();
    assert_eq!(conversation.branch_type, Some(BranchType::Manipulator));
    assert_eq!(conversation.target_product_id, Some(1));
}

#[tokio::test]
async fn test_generation_history_excludes_current_message() {
    let store = seeded_store().await;
    let generator = RecordingGenerator::default();
    let gw = gateway(
        store,
        FixedExtractor { keywords: vec![] },
        generator.clone(),
    );

    gw.ingest_message(text_event("c6", "m1", "first message"))
        .await
        .unwrap();
    gw.ingest_message(text_event("c6", "m2", "second message"))
        .await
        .unwrap();

    let histories = generator.histories.lock().unwrap();
    // First turn starts from an empty thread.
    assert!(histories[0].is_empty());
    // Second turn sees the first exchange, but not its own message;
    // that travels separately as `customer_message`.
    let second: Vec<&str> = histories[1].iter().map(|h| h.content.as_str()).collect();
    assert_eq!(second, vec!["first message", "noted"]);
}

#[tokio::test]
async fn test_generation_failure_leaves_state_intact() {
    let store = seeded_store().await;
    let gw = gateway(
        store.clone(),
        FixedExtractor {
            keywords: vec!["sci-fi".to_string()],
        },
        FailingGenerator,
    );

    let err = gw
        .ingest_message(text_event("c3", "m1", "any sci-fi books?"))
        .await
        .unwrap_err();
    assert!(matches!(err, LeadflowError::Provider(_)));

    // Customer message persisted, conversation still active, no reply.
    let conversation = store
        .get_or_create_conversation("c3", None, None, Platform::Facebook, "thread-c3")
        .await
        .unwrap();
    assert_eq!(conversation.state, ConversationState::Active);
    assert_eq!(conversation.total_messages, 1);
    assert_eq!(conversation.ai_response_count, 0);
}

#[tokio::test]
async fn test_event_without_content_rejected() {
    let store = seeded_store().await;
    let gw = gateway(
        store,
        FixedExtractor { keywords: vec![] },
        FixedGenerator {
            reply: "hi".to_string(),
        },
    );

    let mut event = text_event("c4", "m1", "hello");
    event.message.text = Some("   ".to_string());
    let err = gw.ingest_message(event).await.unwrap_err();
    assert!(matches!(err, LeadflowError::Validation(_)));
}

#[tokio::test]
async fn test_sweep_abandons_idle_conversations() {
    let store = seeded_store().await;
    store
        .get_or_create_conversation("c5", None, None, Platform::WhatsApp, "thread-c5")
        .await
        .unwrap();

    let mut config = test_config();
    config.engagement.inactivity_minutes = 0;
    let gw = Gateway::new(
        store.clone(),
        Arc::new(FixedExtractor { keywords: vec![] }),
        Arc::new(FixedGenerator {
            reply: "hi".to_string(),
        }),
        &config,
    );

    let abandoned = gw.sweep_idle().await.unwrap();
    assert_eq!(abandoned, 1);

    let conversation = store
        .get_or_create_conversation("c5", None, None, Platform::WhatsApp, "thread-c5")
        .await
        .unwrap();
    // The abandoned thread is not reused; a fresh one is created.
    assert_eq!(conversation.state, ConversationState::Active);
    assert_eq!(conversation.total_messages, 0);

    let stats = store.conversation_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);
}
