//! The engagement gateway: consumes inbound events, runs the
//! message-processing pipeline, and sweeps idle conversations.

mod pipeline;
mod sweeper;
#[cfg(test)]
mod tests;

use crate::source::EventSource;
use leadflow_core::config::{Config, EngagementConfig};
use leadflow_core::error::LeadflowError;
use leadflow_core::traits::{KeywordExtractor, ResponseGenerator};
use leadflow_memory::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Gateway {
    store: Store,
    extractor: Arc<dyn KeywordExtractor>,
    generator: Arc<dyn ResponseGenerator>,
    engagement: EngagementConfig,
    /// Per-attempt budget for external collaborator calls.
    call_budget: Duration,
    call_attempts: u32,
    max_context_messages: usize,
}

impl Gateway {
    pub fn new(
        store: Store,
        extractor: Arc<dyn KeywordExtractor>,
        generator: Arc<dyn ResponseGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            extractor,
            generator,
            engagement: config.engagement.clone(),
            call_budget: Duration::from_secs(config.provider.timeout_secs),
            call_attempts: config.provider.max_retries,
            max_context_messages: config.memory.max_context_messages,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run until every source closes. Spawns the idle-conversation
    /// sweeper alongside the event loop.
    pub async fn run(
        self: Arc<Self>,
        sources: Vec<Arc<dyn EventSource>>,
    ) -> Result<(), LeadflowError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(256);

        for source in sources {
            let mut events = source.start().await?;
            info!("source started: {}", source.name());
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let sweeper = tokio::spawn(Arc::clone(&self).sweeper_loop());

        while let Some(event) = rx.recv().await {
            let customer = event.customer_id.clone();
            let platform = event.platform;
            match self.ingest_message(event).await {
                Ok(outcome) => info!(
                    "ingested: conversation={} branch={} matches={} state={}",
                    outcome.conversation_id,
                    outcome.branch_decision.branch_type,
                    outcome.matches.len(),
                    outcome.new_state,
                ),
                Err(e) if e.is_retryable() => {
                    warn!("ingest deferred for {customer} on {platform}: {e}")
                }
                Err(e) => error!("ingest failed for {customer} on {platform}: {e}"),
            }
        }

        sweeper.abort();
        info!("all sources closed, gateway stopping");
        Ok(())
    }
}
