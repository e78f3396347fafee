use std::path::Path;

use prfirm_core::config::AppConfig;
use prfirm_core::error::PrFirmError;
use prfirm_core::platform::{HashtagPlacement, PlatformRegistry};
use prfirm_test_utils::config_file;

#[test]
fn test_load_full_config_from_file() {
    let file = config_file(
        r#"
[model]
provider = "groq"
model_id = "llama-3.1-70b"
api_key = "gsk-test-key"
max_tokens = 2048
temperature = 0.4

[resilience.rate_limit]
max_calls = 12
period_secs = 30

[resilience.circuit_breaker]
failure_threshold = 3
open_duration_secs = 20

[pipeline]
revision_threshold = 3
batch_concurrency = 2
generation_max_retries = 1
generation_wait_secs = 1

[[platforms]]
name = "mastodon"
display_name = "Mastodon"
aliases = ["toot"]
structure = ["hook", "body"]
default_intent = "community update"

[platforms.limits]
chars = 500

[platforms.hashtags]
placement = "end"
max = 3
"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.resilience.rate_limit.max_calls, 12);
    assert_eq!(config.resilience.rate_limit.period_secs, 30);
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.pipeline.revision_threshold, 3);
    assert_eq!(config.pipeline.batch_concurrency, 2);
    // unset pipeline keys keep their defaults
    assert_eq!(config.pipeline.validation_max_retries, 1);
    assert_eq!(config.pipeline.editor_passes, 2);

    let registry = PlatformRegistry::from_overrides(&config.platforms);
    assert_eq!(registry.canonical_name("Toot").as_deref(), Some("mastodon"));
    let spec = registry.get("mastodon").unwrap();
    assert_eq!(spec.limits.chars, Some(500));
    assert_eq!(spec.hashtags.placement, HashtagPlacement::End);
    assert_eq!(spec.budget_for("hook"), 250);
    assert!(registry.contains("linkedin"));
}

#[test]
fn test_env_var_expansion_in_file() {
    std::env::set_var("PRFIRM_IT_API_KEY", "sk-from-env");
    let file = config_file("[model]\napi_key = \"${PRFIRM_IT_API_KEY}\"\n");
    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.model.api_key.as_deref(), Some("sk-from-env"));
    std::env::remove_var("PRFIRM_IT_API_KEY");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let path = Path::new("/nonexistent/prfirm.toml");
    assert!(matches!(
        AppConfig::load(path),
        Err(PrFirmError::ConfigNotFound(_))
    ));
    let config = AppConfig::load_or_default(path).unwrap();
    assert_eq!(config.pipeline.revision_threshold, 5);
    assert_eq!(config.resilience.rate_limit.max_calls, 30);
}

#[test]
fn test_invalid_values_rejected() {
    let zero_calls = config_file("[resilience.rate_limit]\nmax_calls = 0\n");
    let err = AppConfig::load(zero_calls.path()).unwrap_err();
    assert!(err.to_string().contains("max_calls"));

    let zero_fan_out = config_file("[pipeline]\nbatch_concurrency = 0\n");
    assert!(AppConfig::load(zero_fan_out.path()).is_err());

    let malformed = config_file("[pipeline\nrevision_threshold = 5\n");
    assert!(matches!(
        AppConfig::load(malformed.path()),
        Err(PrFirmError::Config(_))
    ));
}

#[test]
fn test_resolved_config_round_trips_through_toml() {
    let mut config = AppConfig::default();
    config.pipeline.revision_threshold = 9;
    let rendered = config.to_toml().unwrap();
    let file = config_file(&rendered);
    let reloaded = AppConfig::load(file.path()).unwrap();
    assert_eq!(reloaded.pipeline.revision_threshold, 9);
    assert_eq!(reloaded.model.provider, config.model.provider);
}
