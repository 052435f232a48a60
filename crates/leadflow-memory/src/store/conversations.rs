//! Conversation aggregate persistence.
//!
//! All writes to a conversation go through an optimistic version check
//! (`UPDATE ... WHERE version = ?`), so concurrent webhook events for
//! the same thread serialize: the loser of a race retries against the
//! fresh version, and message order always reflects arrival order.

use super::{fmt_ts, parse_ts, parse_ts_opt, Store};
use chrono::{Duration, Utc};
use leadflow_core::conversation::{
    Conversation, ConversationState, LeadQualification, Message, MessageRole, Platform,
};
use leadflow_core::engage::{BranchDecision, BranchType, HistoryEntry};
use leadflow_core::error::LeadflowError;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

/// Retry bound for version conflicts on rare single-row updates
/// (transitions, branch binding). Message appends use the configured
/// `max_persistence_attempts` instead.
const TRANSITION_RETRIES: u32 = 3;

/// Pause between optimistic-lock retries.
const RETRY_BACKOFF_MS: u64 = 5;

/// Conversation analytics snapshot.
#[derive(Debug, Clone)]
pub struct ConversationStats {
    pub total: i64,
    pub active: i64,
    pub qualified: i64,
    pub completed: i64,
    /// Conversations per platform, ordered by platform name.
    pub platform_breakdown: Vec<(String, i64)>,
}

fn storage(e: sqlx::Error) -> LeadflowError {
    LeadflowError::Storage(e.to_string())
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, LeadflowError> {
    let state: String = row.try_get("state").map_err(storage)?;
    let platform: String = row.try_get("platform").map_err(storage)?;
    let branch_type: Option<String> = row.try_get("branch_type").map_err(storage)?;
    let qualification: Option<String> = row.try_get("lead_qualification").map_err(storage)?;
    let handoff: Option<String> = row.try_get("handoff_data").map_err(storage)?;
    let started_at: String = row.try_get("started_at").map_err(storage)?;
    let last_message_at: Option<String> = row.try_get("last_message_at").map_err(storage)?;
    let qualified_at: Option<String> = row.try_get("qualified_at").map_err(storage)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(storage)?;

    Ok(Conversation {
        id: row.try_get("id").map_err(storage)?,
        customer_id: row.try_get("customer_id").map_err(storage)?,
        customer_name: row.try_get("customer_name").map_err(storage)?,
        customer_username: row.try_get("customer_username").map_err(storage)?,
        platform: Platform::from_str(&platform)?,
        platform_conversation_id: row
            .try_get("platform_conversation_id")
            .map_err(storage)?,
        state: ConversationState::from_str(&state)?,
        branch_type: branch_type.as_deref().map(BranchType::from_str).transpose()?,
        target_product_id: row.try_get("target_product_id").map_err(storage)?,
        messages: Vec::new(),
        lead_qualification: qualification
            .as_deref()
            .map(serde_json::from_str::<LeadQualification>)
            .transpose()?,
        total_messages: row.try_get("total_messages").map_err(storage)?,
        ai_response_count: row.try_get("ai_response_count").map_err(storage)?,
        outcome: row.try_get("outcome").map_err(storage)?,
        handoff_data: handoff
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?,
        version: row.try_get("version").map_err(storage)?,
        started_at: parse_ts(&started_at)?,
        last_message_at: parse_ts_opt(last_message_at.as_deref())?,
        qualified_at: parse_ts_opt(qualified_at.as_deref())?,
        completed_at: parse_ts_opt(completed_at.as_deref())?,
    })
}

type MessageRow = (
    String,         // id
    String,         // role
    String,         // content
    String,         // message_type
    String,         // timestamp
    Option<String>, // extracted_keywords
    Option<String>, // matched_products
    Option<f64>,    // correlation_score
);

fn row_to_message(row: MessageRow) -> Result<Message, LeadflowError> {
    Ok(Message {
        id: row.0,
        role: row.1.parse()?,
        content: row.2,
        message_type: row.3.parse()?,
        timestamp: parse_ts(&row.4)?,
        extracted_keywords: match row.5 {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        },
        matched_products: match row.6 {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        },
        correlation_score: row.7,
    })
}

impl Store {
    /// Get or create the conversation for a customer thread.
    ///
    /// Reuses the newest non-terminal conversation for the
    /// (customer, platform, thread) triple; terminal conversations are
    /// read-only history, so a new thread starts fresh.
    pub async fn get_or_create_conversation(
        &self,
        customer_id: &str,
        customer_name: Option<&str>,
        customer_username: Option<&str>,
        platform: Platform,
        platform_conversation_id: &str,
    ) -> Result<Conversation, LeadflowError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM conversations \
             WHERE customer_id = ? AND platform = ? AND platform_conversation_id = ? \
             AND state IN ('active', 'qualified') \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(customer_id)
        .bind(platform.as_str())
        .bind(platform_conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        if let Some((id,)) = row {
            return self.get_conversation(&id).await;
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO conversations \
             (id, customer_id, customer_name, customer_username, platform, \
              platform_conversation_id, state, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'active', ?)",
        )
        .bind(&id)
        .bind(customer_id)
        .bind(customer_name)
        .bind(customer_username)
        .bind(platform.as_str())
        .bind(platform_conversation_id)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        self.get_conversation(&id).await
    }

    /// Fetch the full aggregate: conversation, ordered messages, and
    /// qualification.
    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, LeadflowError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        let row = row.ok_or_else(|| LeadflowError::NotFound(format!("conversation {id}")))?;
        let mut conversation = row_to_conversation(&row)?;

        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, role, content, message_type, timestamp, \
             extracted_keywords, matched_products, correlation_score \
             FROM messages WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        conversation.messages = rows
            .into_iter()
            .map(row_to_message)
            .collect::<Result<_, _>>()?;

        Ok(conversation)
    }

    /// Append a message, atomically.
    ///
    /// Optimistic concurrency: the conversation's version is bumped in
    /// the same transaction as the message insert; a version conflict
    /// rolls back and retries up to `max_attempts`, then fails with
    /// `ConcurrencyConflict`. No partial writes either way.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
        max_attempts: u32,
    ) -> Result<(), LeadflowError> {
        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    RETRY_BACKOFF_MS << attempt,
                ))
                .await;
            }

            let mut tx = self.pool.begin().await.map_err(storage)?;

            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT state, version FROM conversations WHERE id = ?")
                    .bind(conversation_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage)?;

            let (state_str, version) = row.ok_or_else(|| {
                LeadflowError::NotFound(format!("conversation {conversation_id}"))
            })?;
            let state: ConversationState = state_str.parse()?;
            if state.is_terminal() {
                return Err(LeadflowError::Validation(format!(
                    "conversation {conversation_id} is {state}; messages are read-only"
                )));
            }

            let is_assistant = (message.role == MessageRole::Assistant) as i64;
            let updated = sqlx::query(
                "UPDATE conversations SET version = version + 1, \
                 total_messages = total_messages + 1, \
                 ai_response_count = ai_response_count + ?, \
                 last_message_at = ? \
                 WHERE id = ? AND version = ?",
            )
            .bind(is_assistant)
            .bind(fmt_ts(message.timestamp))
            .bind(conversation_id)
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            if updated.rows_affected() == 0 {
                // Lost the race; retry against the fresh version.
                tx.rollback().await.map_err(storage)?;
                continue;
            }

            let keywords_json = if message.extracted_keywords.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.extracted_keywords)?)
            };
            let matched_json = if message.matched_products.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.matched_products)?)
            };

            sqlx::query(
                "INSERT INTO messages \
                 (id, conversation_id, seq, role, content, message_type, timestamp, \
                  extracted_keywords, matched_products, correlation_score) \
                 VALUES (?, ?, \
                  (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?), \
                  ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&message.id)
            .bind(conversation_id)
            .bind(conversation_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.message_type.as_str())
            .bind(fmt_ts(message.timestamp))
            .bind(&keywords_json)
            .bind(&matched_json)
            .bind(message.correlation_score)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            tx.commit().await.map_err(storage)?;
            return Ok(());
        }

        Err(LeadflowError::ConcurrencyConflict(format!(
            "append to conversation {conversation_id} lost {max_attempts} version races"
        )))
    }

    /// Attach extraction and correlation results to a stored message.
    /// Rejected on terminal conversations.
    pub async fn record_message_analysis(
        &self,
        conversation_id: &str,
        message_id: &str,
        keywords: &[String],
        matched_products: &[i64],
        best_score: Option<f64>,
    ) -> Result<(), LeadflowError> {
        self.ensure_not_terminal(conversation_id).await?;

        let result = sqlx::query(
            "UPDATE messages SET extracted_keywords = ?, matched_products = ?, \
             correlation_score = ? WHERE conversation_id = ? AND id = ?",
        )
        .bind(serde_json::to_string(keywords)?)
        .bind(serde_json::to_string(matched_products)?)
        .bind(best_score)
        .bind(conversation_id)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(LeadflowError::NotFound(format!(
                "message {message_id} in conversation {conversation_id}"
            )));
        }
        Ok(())
    }

    /// Persist a branch decision.
    ///
    /// Enforces the invariant that `target_product_id` is set exactly
    /// for the manipulator branch. Rejected on terminal conversations;
    /// the sweeper may have abandoned the thread since the caller last
    /// looked at it.
    pub async fn set_branch(
        &self,
        conversation_id: &str,
        decision: &BranchDecision,
    ) -> Result<(), LeadflowError> {
        match (decision.branch_type, decision.target_product_id) {
            (BranchType::Manipulator, None) => {
                return Err(LeadflowError::Validation(
                    "manipulator branch requires a target product".into(),
                ));
            }
            (BranchType::Convincer, Some(_)) => {
                return Err(LeadflowError::Validation(
                    "target_product_id is only valid for the manipulator branch".into(),
                ));
            }
            _ => {}
        }

        self.ensure_not_terminal(conversation_id).await?;

        let result = sqlx::query(
            "UPDATE conversations SET branch_type = ?, target_product_id = ?, \
             version = version + 1 WHERE id = ?",
        )
        .bind(decision.branch_type.as_str())
        .bind(decision.target_product_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(LeadflowError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        Ok(())
    }

    /// Explicitly clear the branch binding, releasing a sticky
    /// manipulator target. Rejected on terminal conversations.
    pub async fn reset_branch(&self, conversation_id: &str) -> Result<(), LeadflowError> {
        self.ensure_not_terminal(conversation_id).await?;

        let result = sqlx::query(
            "UPDATE conversations SET branch_type = NULL, target_product_id = NULL, \
             version = version + 1 WHERE id = ?",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(LeadflowError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        Ok(())
    }

    /// Record a qualification assessment, replacing any previous one
    /// wholesale. An `is_qualified` assessment transitions
    /// Active -> Qualified and sets `qualified_at`; the branch binding
    /// is left untouched.
    pub async fn apply_qualification(
        &self,
        conversation_id: &str,
        qualification: &LeadQualification,
    ) -> Result<ConversationState, LeadflowError> {
        let json = serde_json::to_string(qualification)?;

        for attempt in 0..TRANSITION_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS)).await;
            }

            let (state, version) = self.load_state_version(conversation_id).await?;

            let new_state = if qualification.is_qualified {
                match state {
                    ConversationState::Active => state.transition(ConversationState::Qualified)?,
                    // Re-assessment of an already-qualified lead:
                    // replace the record, keep the state.
                    ConversationState::Qualified => state,
                    _ => {
                        return Err(LeadflowError::InvalidTransition {
                            from: state,
                            to: ConversationState::Qualified,
                        })
                    }
                }
            } else if state.is_terminal() {
                return Err(LeadflowError::Validation(format!(
                    "conversation {conversation_id} is {state}; assessments are read-only"
                )));
            } else {
                state
            };
            let transitions = new_state != state;

            let result = if transitions {
                sqlx::query(
                    "UPDATE conversations SET lead_qualification = ?, state = 'qualified', \
                     qualified_at = ?, version = version + 1 WHERE id = ? AND version = ?",
                )
                .bind(&json)
                .bind(fmt_ts(Utc::now()))
                .bind(conversation_id)
                .bind(version)
                .execute(&self.pool)
                .await
            } else {
                sqlx::query(
                    "UPDATE conversations SET lead_qualification = ?, \
                     version = version + 1 WHERE id = ? AND version = ?",
                )
                .bind(&json)
                .bind(conversation_id)
                .bind(version)
                .execute(&self.pool)
                .await
            }
            .map_err(storage)?;

            if result.rows_affected() > 0 {
                return Ok(new_state);
            }
        }

        Err(LeadflowError::ConcurrencyConflict(format!(
            "qualification of conversation {conversation_id} lost {TRANSITION_RETRIES} version races"
        )))
    }

    /// Record the handoff payload: Qualified -> Completed, sets
    /// `completed_at`.
    pub async fn record_handoff(
        &self,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), LeadflowError> {
        let json = serde_json::to_string(payload)?;
        self.transition(
            conversation_id,
            ConversationState::Completed,
            "handoff",
            Some(&json),
        )
        .await
    }

    /// Abandon an idle conversation (invoked by the sweeper).
    pub async fn mark_abandoned(&self, conversation_id: &str) -> Result<(), LeadflowError> {
        self.transition(
            conversation_id,
            ConversationState::Abandoned,
            "inactivity",
            None,
        )
        .await
    }

    /// Record an unrecoverable processing error against a conversation.
    pub async fn mark_failed(
        &self,
        conversation_id: &str,
        reason: &str,
    ) -> Result<(), LeadflowError> {
        self.transition(conversation_id, ConversationState::Failed, reason, None)
            .await
    }

    /// Validated, atomic state transition. Invalid attempts fail with
    /// `InvalidTransition` and leave the record untouched.
    async fn transition(
        &self,
        conversation_id: &str,
        to: ConversationState,
        outcome: &str,
        handoff_json: Option<&str>,
    ) -> Result<(), LeadflowError> {
        for attempt in 0..TRANSITION_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS)).await;
            }

            let (state, version) = self.load_state_version(conversation_id).await?;
            state.transition(to)?;

            let completed_at = (to == ConversationState::Completed).then(|| fmt_ts(Utc::now()));

            let result = sqlx::query(
                "UPDATE conversations SET state = ?, outcome = ?, \
                 handoff_data = COALESCE(?, handoff_data), \
                 completed_at = COALESCE(?, completed_at), \
                 version = version + 1 WHERE id = ? AND version = ?",
            )
            .bind(to.as_str())
            .bind(outcome)
            .bind(handoff_json)
            .bind(completed_at)
            .bind(conversation_id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

            if result.rows_affected() > 0 {
                return Ok(());
            }
        }

        Err(LeadflowError::ConcurrencyConflict(format!(
            "transition of conversation {conversation_id} lost {TRANSITION_RETRIES} version races"
        )))
    }

    /// Terminal conversations are read-only history; every writer that
    /// does not already inspect the state goes through this guard.
    async fn ensure_not_terminal(&self, conversation_id: &str) -> Result<(), LeadflowError> {
        let (state, _) = self.load_state_version(conversation_id).await?;
        if state.is_terminal() {
            return Err(LeadflowError::Validation(format!(
                "conversation {conversation_id} is {state}; no further writes allowed"
            )));
        }
        Ok(())
    }

    async fn load_state_version(
        &self,
        conversation_id: &str,
    ) -> Result<(ConversationState, i64), LeadflowError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT state, version FROM conversations WHERE id = ?")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        let (state, version) = row.ok_or_else(|| {
            LeadflowError::NotFound(format!("conversation {conversation_id}"))
        })?;
        Ok((state.parse()?, version))
    }

    /// Recent history for the response generator, oldest first.
    pub async fn recent_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, LeadflowError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT role, content FROM messages \
             WHERE conversation_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .into_iter()
            .rev()
            .map(|(role, content)| HistoryEntry { role, content })
            .collect())
    }

    /// Non-terminal conversations idle beyond the inactivity window.
    /// Returns (id, customer_id, platform).
    pub async fn find_idle_conversations(
        &self,
        window_minutes: i64,
    ) -> Result<Vec<(String, String, String)>, LeadflowError> {
        let cutoff = fmt_ts(Utc::now() - Duration::minutes(window_minutes));
        sqlx::query_as(
            "SELECT id, customer_id, platform FROM conversations \
             WHERE state IN ('active', 'qualified') \
             AND COALESCE(last_message_at, started_at) <= ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)
    }

    /// Conversation analytics.
    pub async fn conversation_stats(&self) -> Result<ConversationStats, LeadflowError> {
        let count = |state: &'static str| {
            let pool = self.pool.clone();
            async move {
                let (n,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE state = ?")
                        .bind(state)
                        .fetch_one(&pool)
                        .await
                        .map_err(storage)?;
                Ok::<i64, LeadflowError>(n)
            }
        };

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let platform_breakdown: Vec<(String, i64)> = sqlx::query_as(
            "SELECT platform, COUNT(*) FROM conversations GROUP BY platform ORDER BY platform",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(ConversationStats {
            total,
            active: count("active").await?,
            qualified: count("qualified").await?,
            completed: count("completed").await?,
            platform_breakdown,
        })
    }
}
