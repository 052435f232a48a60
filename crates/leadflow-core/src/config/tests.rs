use super::*;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.engagement.correlation_threshold, 0.8);
    assert_eq!(config.engagement.max_matches, 5);
    assert_eq!(config.engagement.inactivity_minutes, 30);
    assert_eq!(config.engagement.max_persistence_attempts, 3);
    assert_eq!(config.provider.timeout_secs, 30);
    assert_eq!(config.provider.max_retries, 3);
}

#[test]
fn test_engagement_from_toml() {
    let toml_str = r#"
        [engagement]
        correlation_threshold = 0.4
        max_matches = 10
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.engagement.correlation_threshold, 0.4);
    assert_eq!(config.engagement.max_matches, 10);
    // Untouched fields keep their defaults.
    assert_eq!(config.engagement.inactivity_minutes, 30);
}

#[test]
fn test_startup_check_reports_missing_credentials() {
    let config = Config::default();
    let missing = config.startup_check();
    assert!(missing.iter().any(|m| m.contains("provider.endpoint")));
    assert!(missing.iter().any(|m| m.contains("provider.api_key")));
    assert!(missing
        .iter()
        .any(|m| m.contains("facebook_verify_token")));
}

#[test]
fn test_startup_check_clean_when_configured() {
    let toml_str = r#"
        [provider]
        endpoint = "https://example.openai.azure.com/v1/chat/completions"
        api_key = "sk-test"

        [webhook]
        facebook_verify_token = "fb"
        instagram_verify_token = "ig"
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.startup_check().is_empty());
}

#[test]
fn test_startup_check_flags_bad_threshold() {
    let toml_str = r#"
        [engagement]
        correlation_threshold = 1.5
    "#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config
        .startup_check()
        .iter()
        .any(|m| m.contains("correlation_threshold")));
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let config = Config::load("/nonexistent/leadflow-config.toml").unwrap();
    assert_eq!(config.service.name, "leadflow");
}
