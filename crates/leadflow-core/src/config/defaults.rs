//! Default values for config fields, referenced by serde attributes.

pub(super) fn default_name() -> String {
    "leadflow".to_string()
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

pub(super) fn default_provider_timeout() -> u64 {
    30
}

pub(super) fn default_max_retries() -> u32 {
    3
}

pub(super) fn default_temperature() -> f32 {
    0.7
}

pub(super) fn default_max_tokens() -> u32 {
    300
}

pub(super) fn default_db_path() -> String {
    "~/.leadflow/data/leadflow.db".to_string()
}

pub(super) fn default_max_context() -> usize {
    20
}

pub(super) fn default_correlation_threshold() -> f64 {
    0.8
}

pub(super) fn default_max_matches() -> usize {
    5
}

pub(super) fn default_inactivity_minutes() -> i64 {
    30
}

pub(super) fn default_max_persistence_attempts() -> u32 {
    3
}

pub(super) fn default_sweep_interval() -> u64 {
    60
}
