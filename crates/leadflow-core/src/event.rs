//! Inbound webhook event types.
//!
//! The webhook transport (signature verification, platform fan-out) is
//! an external collaborator; by the time an event reaches the gateway it
//! has been validated and flattened to one message per event.

use crate::conversation::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validated inbound messaging event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_username: Option<String>,
    pub platform: Platform,
    pub platform_conversation_id: String,
    pub message: InboundMessage,
}

/// The message payload of an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-supplied message ID.
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Option<Vec<serde_json::Value>>,
    /// Quick-reply payload, if the customer tapped one.
    #[serde(default)]
    pub quick_reply: Option<HashMap<String, String>>,
    /// Postback payload from a button tap.
    #[serde(default)]
    pub postback: Option<HashMap<String, String>>,
}

impl InboundMessage {
    /// The text content to process: message text, else the quick-reply
    /// payload, else the postback payload.
    pub fn content(&self) -> Option<&str> {
        if let Some(text) = self.text.as_deref() {
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
        if let Some(qr) = &self.quick_reply {
            if let Some(payload) = qr.get("payload") {
                return Some(payload);
            }
        }
        if let Some(pb) = &self.postback {
            if let Some(payload) = pb.get("payload") {
                return Some(payload);
            }
        }
        None
    }

    /// A postback or quick-reply payload of the form `product:<id>` is a
    /// direct product reference and binds the manipulator branch.
    pub fn direct_product_reference(&self) -> Option<i64> {
        let payload = self
            .postback
            .as_ref()
            .and_then(|pb| pb.get("payload"))
            .or_else(|| self.quick_reply.as_ref().and_then(|qr| qr.get("payload")))?;
        payload.strip_prefix("product:")?.trim().parse().ok()
    }
}
