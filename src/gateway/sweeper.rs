//! Idle-conversation sweeper.
//!
//! Conversations with no message inside the inactivity window are
//! marked abandoned. Runs on a fixed interval next to the event loop.

use super::Gateway;
use leadflow_core::error::LeadflowError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

impl Gateway {
    /// One sweep: abandon every conversation idle past the window.
    /// Returns the number of conversations abandoned.
    pub async fn sweep_idle(&self) -> Result<usize, LeadflowError> {
        let idle = self
            .store
            .find_idle_conversations(self.engagement.inactivity_minutes)
            .await?;

        let mut abandoned = 0;
        for (id, customer_id, platform) in &idle {
            match self.store.mark_abandoned(id).await {
                Ok(()) => {
                    info!("abandoned idle conversation {id} ({customer_id} on {platform})");
                    abandoned += 1;
                }
                // Lost a race with a concurrent transition; skip it.
                Err(e) => warn!("could not abandon conversation {id}: {e}"),
            }
        }
        Ok(abandoned)
    }

    pub(super) async fn sweeper_loop(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.engagement.sweep_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match self.sweep_idle().await {
                Ok(0) => {}
                Ok(n) => info!("sweeper: abandoned {n} idle conversation(s)"),
                Err(e) => warn!("sweeper: sweep failed: {e}"),
            }
        }
    }
}
