use std::io::Write;

use tempfile::NamedTempFile;

use prfirm_core::config::AppConfig;
use prfirm_core::state::{CampaignRequest, SharedState};

/// Config with zero retry waits so retries do not slow tests down.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.generation_wait_secs = 0;
    config.pipeline.validation_wait_secs = 0;
    config
}

/// Fresh state requesting the given platforms on a fixed topic.
pub fn campaign_state(platforms: &[&str]) -> SharedState {
    SharedState::new(CampaignRequest {
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        topic: "Launch of the Acme scheduling assistant".into(),
        ..Default::default()
    })
}

/// Write `contents` to a temporary `.toml` file that lives as long as the handle.
pub fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

/// JSON reply for the intent-proposal prompt.
pub fn intents_reply(pairs: &[(&str, &str)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    serde_json::Value::Object(map).to_string()
}
