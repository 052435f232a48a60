//! Event sources feeding the gateway.
//!
//! The webhook transport (HTTP routing, signature verification) is an
//! external collaborator; it hands the gateway validated events. An
//! `EventSource` is anything that can produce such events.

use async_trait::async_trait;
use leadflow_core::error::LeadflowError;
use leadflow_core::event::InboundEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A producer of validated inbound events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Start producing events. Returns a receiver that yields them.
    async fn start(&self) -> Result<mpsc::Receiver<InboundEvent>, LeadflowError>;
}

/// Reads newline-delimited `InboundEvent` JSON from stdin.
///
/// Used for local runs and replaying captured webhook traffic.
pub struct JsonLinesSource;

#[async_trait]
impl EventSource for JsonLinesSource {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn start(&self) -> Result<mpsc::Receiver<InboundEvent>, LeadflowError> {
        let (tx, rx) = mpsc::channel::<InboundEvent>(256);

        std::thread::spawn(move || {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("json-lines: read error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InboundEvent>(&line) {
                    Ok(event) => {
                        if tx.blocking_send(event).is_err() {
                            break; // gateway shut down
                        }
                    }
                    Err(e) => warn!("json-lines: skipping malformed event: {e}"),
                }
            }
            info!("json-lines: input closed");
        });

        Ok(rx)
    }
}
