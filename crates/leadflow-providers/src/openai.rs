//! OpenAI-compatible collaborators.
//!
//! Both the keyword extractor and the response generator call one
//! chat-completions endpoint (works with OpenAI, Azure OpenAI, and any
//! compatible gateway). The model is instructed to answer with a JSON
//! object; parsing is lenient because models wrap JSON in code fences
//! or fall back to plain prose.

use async_trait::async_trait;
use leadflow_core::config::ProviderConfig;
use leadflow_core::engage::{
    ExtractionRequest, ExtractionResult, GeneratedReply, GenerationRequest,
};
use leadflow_core::error::LeadflowError;
use leadflow_core::traits::{KeywordExtractor, ResponseGenerator};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shared chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

impl OpenAiClient {
    /// Create from config values.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }

    /// One chat turn: system prompt + user content, returns the raw
    /// assistant text.
    async fn chat(&self, system: &str, user: String) -> Result<String, LeadflowError> {
        if !self.configured() {
            return Err(LeadflowError::Config(
                "provider endpoint/api_key not configured".into(),
            ));
        }

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("openai: POST {} model={}", self.endpoint, self.model);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("api-key", &self.api_key) // Azure uses api-key, OpenAI ignores it
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadflowError::Provider(format!("openai request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LeadflowError::Provider(format!(
                "openai returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LeadflowError::Provider(format!("openai: failed to parse response: {e}")))?;

        parsed
            .choices
            .and_then(|mut c| c.drain(..).next())
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| LeadflowError::Provider("openai: empty response".into()))
    }
}

/// Strip a Markdown code fence, if the model wrapped its JSON in one.
fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse an extraction reply. Unparseable output degrades to an empty
/// result rather than an error: no keywords simply means no matches.
fn parse_extraction(text: &str) -> ExtractionResult {
    serde_json::from_str(strip_fence(text)).unwrap_or_default()
}

/// Parse a generation reply. Falls back to treating the whole output as
/// plain response text.
fn parse_reply(text: &str) -> GeneratedReply {
    let stripped = strip_fence(text);
    serde_json::from_str(stripped).unwrap_or_else(|_| GeneratedReply {
        response_text: text.trim().to_string(),
        confidence_score: None,
        products_mentioned: Vec::new(),
        suggested_state: None,
    })
}

const EXTRACTOR_SYSTEM_PROMPT: &str = "You extract product-intent keywords from customer \
messages on social media. Answer ONLY with a JSON object: \
{\"keywords\": [\"...\"], \"confidence_scores\": {\"keyword\": 0.0}}. \
Keywords are short, lower-case noun phrases. No commentary.";

const GENERATOR_SYSTEM_PROMPT: &str = "You are a sales assistant replying to a customer on \
social media. Be concise and helpful; mention at most one product unless asked. Answer ONLY \
with a JSON object: {\"response_text\": \"...\", \"confidence_score\": 0.0, \
\"products_mentioned\": [], \"suggested_state\": null}.";

/// Keyword extraction over the chat endpoint.
pub struct OpenAiExtractor {
    client: OpenAiClient,
}

impl OpenAiExtractor {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: OpenAiClient::from_config(config),
        }
    }
}

#[async_trait]
impl KeywordExtractor for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai-extractor"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, LeadflowError> {
        let mut user = String::new();
        if !request.conversation_context.is_empty() {
            user.push_str("Recent conversation:\n");
            for line in &request.conversation_context {
                user.push_str(line);
                user.push('\n');
            }
            user.push('\n');
        }
        user.push_str("Customer message:\n");
        user.push_str(&request.message_text);

        let content = self.client.chat(EXTRACTOR_SYSTEM_PROMPT, user).await?;
        Ok(parse_extraction(&content))
    }

    async fn is_available(&self) -> bool {
        self.client.configured()
    }
}

/// Response generation over the chat endpoint.
pub struct OpenAiGenerator {
    client: OpenAiClient,
}

impl OpenAiGenerator {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: OpenAiClient::from_config(config),
        }
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai-generator"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedReply, LeadflowError> {
        let mut user = format!("Goal: {}\n\n", request.conversation_goal);
        if !request.matched_products.is_empty() {
            user.push_str("Relevant products:\n");
            for m in &request.matched_products {
                user.push_str(&format!(
                    "- [{}] {} (match {:.2})\n",
                    m.product_id, m.product_name, m.correlation_score
                ));
            }
            user.push('\n');
        }
        for entry in &request.history {
            user.push_str(&format!("[{}] {}\n", entry.role, entry.content));
        }
        user.push_str(&format!("[customer] {}", request.customer_message));

        let content = self.client.chat(GENERATOR_SYSTEM_PROMPT, user).await?;
        Ok(parse_reply(&content))
    }

    async fn is_available(&self) -> bool {
        self.client.configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::conversation::ConversationState;

    #[test]
    fn test_strip_fence() {
        assert_eq!(strip_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_extraction_valid_json() {
        let result = parse_extraction(
            r#"{"keywords": ["sci-fi", "paperback"], "confidence_scores": {"sci-fi": 0.9}}"#,
        );
        assert_eq!(result.keywords, vec!["sci-fi", "paperback"]);
        assert_eq!(result.confidence_scores["sci-fi"], 0.9);
    }

    #[test]
    fn test_parse_extraction_garbage_degrades_to_empty() {
        let result = parse_extraction("I couldn't find any keywords, sorry!");
        assert!(result.keywords.is_empty());
    }

    #[test]
    fn test_parse_reply_json() {
        let reply = parse_reply(
            r#"```json
            {"response_text": "Dune is great!", "confidence_score": 0.8,
             "products_mentioned": [42], "suggested_state": "qualified"}
            ```"#,
        );
        assert_eq!(reply.response_text, "Dune is great!");
        assert_eq!(reply.products_mentioned, vec![42]);
        assert_eq!(reply.suggested_state, Some(ConversationState::Qualified));
    }

    #[test]
    fn test_parse_reply_prose_fallback() {
        let reply = parse_reply("Sure, happy to help with that!");
        assert_eq!(reply.response_text, "Sure, happy to help with that!");
        assert!(reply.suggested_state.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_client_not_available() {
        let config = ProviderConfig::default();
        let extractor = OpenAiExtractor::from_config(&config);
        assert!(!extractor.is_available().await);
        let generator = OpenAiGenerator::from_config(&config);
        assert!(!generator.is_available().await);
    }
}
