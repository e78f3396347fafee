use prfirm_core::config::AppConfig;
use prfirm_core::platform::PlatformRegistry;
use prfirm_llm::providers::presets::{all_preset_names, get_preset};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_provider(config),
        check_api_key(config),
        check_platforms(config),
        check_revision_loop(config),
        check_fan_out(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_provider(config: &AppConfig) -> CheckResult {
    let provider = &config.model.provider;
    let known = get_preset(provider).is_some();
    let custom_url = config.model.base_url.is_some();
    CheckResult {
        label: "Provider".into(),
        ok: known || custom_url,
        detail: if known {
            format!("{} via {}", config.model.model_id, provider)
        } else if custom_url {
            format!("'{}' with custom base_url", provider)
        } else {
            format!(
                "Unknown provider '{}' and no base_url (known: {})",
                provider,
                all_preset_names().join(", ")
            )
        },
    }
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let configured = config
        .model
        .api_key
        .as_ref()
        .is_some_and(|k| !k.is_empty() && !k.starts_with("${"));
    let preset = get_preset(&config.model.provider);
    let env_var = preset.as_ref().and_then(|p| p.api_key_env);
    let from_env = env_var.is_some_and(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()));
    let needs_key = preset.as_ref().map_or(true, |p| p.needs_api_key());

    let (ok, detail) = if configured {
        (true, "Set in config".to_string())
    } else if from_env {
        (true, format!("Read from {}", env_var.unwrap_or_default()))
    } else if !needs_key {
        (true, "Not required".to_string())
    } else {
        (
            false,
            match env_var {
                Some(var) => format!("No api_key in config and {} is not set", var),
                None => "No api_key in config".to_string(),
            },
        )
    };
    CheckResult {
        label: "API Key".into(),
        ok,
        detail,
    }
}

fn check_platforms(config: &AppConfig) -> CheckResult {
    let registry = PlatformRegistry::from_overrides(&config.platforms);
    let empty: Vec<String> = registry
        .iter()
        .filter(|spec| spec.structure.is_empty())
        .map(|spec| spec.name.clone())
        .collect();
    CheckResult {
        label: "Platforms".into(),
        ok: empty.is_empty(),
        detail: if empty.is_empty() {
            format!("{} registered ({})", registry.names().len(), registry.names().join(", "))
        } else {
            format!("No section structure for: {}", empty.join(", "))
        },
    }
}

fn check_revision_loop(config: &AppConfig) -> CheckResult {
    let threshold = config.pipeline.revision_threshold;
    CheckResult {
        label: "Revision loop".into(),
        ok: threshold > 0,
        detail: if threshold > 0 {
            format!("Escalates after {} violating checks", threshold)
        } else {
            "revision_threshold is 0; every violation escalates immediately".to_string()
        },
    }
}

/// A batch wider than the rate window trips the limiter on its own.
fn check_fan_out(config: &AppConfig) -> CheckResult {
    let concurrency = config.pipeline.batch_concurrency;
    let max_calls = config.resilience.rate_limit.max_calls as usize;
    CheckResult {
        label: "Fan-out".into(),
        ok: concurrency <= max_calls,
        detail: format!(
            "{} concurrent platform(s) against {} calls per {}s",
            concurrency, max_calls, config.resilience.rate_limit.period_secs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = AppConfig::default();
        config.model.provider = "ollama".into();
        assert!(check_api_key(&config).ok);
        assert!(check_provider(&config).ok);
    }

    #[test]
    fn test_unknown_provider_without_url_fails() {
        let mut config = AppConfig::default();
        config.model.provider = "mystery".into();
        assert!(!check_provider(&config).ok);
        config.model.base_url = Some("http://localhost:9000/v1".into());
        assert!(check_provider(&config).ok);
    }

    #[test]
    fn test_fan_out_wider_than_rate_window_flagged() {
        let mut config = AppConfig::default();
        config.pipeline.batch_concurrency = 50;
        assert!(!check_fan_out(&config).ok);
        assert!(check_fan_out(&AppConfig::default()).ok);
    }

    #[test]
    fn test_default_platforms_pass() {
        let check = check_platforms(&AppConfig::default());
        assert!(check.ok);
        assert!(check.detail.starts_with("6 registered"));
    }
}
