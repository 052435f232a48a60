//! TOML configuration.
//!
//! Configuration is an explicitly constructed, immutable value passed
//! into each component at construction time. External credentials and
//! URLs are all optional at load time; `Config::startup_check` reports
//! what is missing so the caller decides whether to refuse to start.

mod defaults;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LeadflowError;
use defaults::*;

/// Top-level Leadflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr only.
    #[serde(default)]
    pub log_file: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

/// AI collaborator settings (keyword extraction and response generation
/// share one OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Chat-completions endpoint URL. Optional; checked at startup.
    #[serde(default)]
    pub endpoint: String,
    /// API key. Optional; checked at startup.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-attempt timeout budget for collaborator calls.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Retry attempts before a timeout surfaces as `UpstreamTimeout`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: default_model(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// History entries passed to the response generator.
    #[serde(default = "default_max_context")]
    pub max_context_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_context_messages: default_max_context(),
        }
    }
}

/// Business-logic tuning for the engagement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Minimum correlation score for a product match, 0..=1.
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
    /// Maximum product matches returned per message.
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
    /// Customer inactivity window before a conversation is abandoned.
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_minutes: i64,
    /// Optimistic-lock retry bound for conversation writes.
    #[serde(default = "default_max_persistence_attempts")]
    pub max_persistence_attempts: u32,
    /// Idle-conversation sweep interval.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: default_correlation_threshold(),
            max_matches: default_max_matches(),
            inactivity_minutes: default_inactivity_minutes(),
            max_persistence_attempts: default_max_persistence_attempts(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Webhook transport credentials. The transport itself is an external
/// collaborator; these are surfaced only by the startup check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub facebook_verify_token: String,
    #[serde(default)]
    pub instagram_verify_token: String,
    #[serde(default)]
    pub webhook_secret: String,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load(path: &str) -> Result<Config, LeadflowError> {
        let path = Path::new(path);
        if !path.exists() {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LeadflowError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| LeadflowError::Config(format!("failed to parse config: {e}")))
    }

    /// Report missing external credentials and out-of-range tuning.
    ///
    /// Returns an empty list when the service can run fully. The caller
    /// decides whether missing entries are fatal (`start`) or merely
    /// reported (`status`).
    pub fn startup_check(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.provider.endpoint.is_empty() {
            missing.push("provider.endpoint is not set".to_string());
        }
        if self.provider.api_key.is_empty() {
            missing.push("provider.api_key is not set".to_string());
        }
        if self.webhook.facebook_verify_token.is_empty() {
            missing.push("webhook.facebook_verify_token is not set".to_string());
        }
        if self.webhook.instagram_verify_token.is_empty() {
            missing.push("webhook.instagram_verify_token is not set".to_string());
        }
        if !(0.0..=1.0).contains(&self.engagement.correlation_threshold) {
            missing.push(format!(
                "engagement.correlation_threshold must be in [0, 1], got {}",
                self.engagement.correlation_threshold
            ));
        }
        if self.engagement.max_matches == 0 {
            missing.push("engagement.max_matches must be positive".to_string());
        }
        missing
    }
}

/// Expand `~` to the home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}
