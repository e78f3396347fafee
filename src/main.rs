mod doctor;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use prfirm_core::config::AppConfig;
use prfirm_core::state::{CampaignRequest, Intent, SharedState};
use prfirm_pipeline::{Pipeline, StageContext};

#[derive(Parser)]
#[command(name = "prfirm", version, about = "Multi-platform marketing copy pipeline")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "prfirm.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a campaign and print the final bundle
    Run {
        /// Target platform (repeatable); defaults to email and linkedin
        #[arg(short, long = "platform")]
        platforms: Vec<String>,
        /// Topic or goal of the campaign
        #[arg(short, long)]
        topic: Option<String>,
        /// Brand bible file (XML-style tags)
        #[arg(long)]
        brand_bible: Option<PathBuf>,
        /// Intent per platform: platform=preset, platform=custom:<text>, platform=auto
        #[arg(long = "intent", value_parser = parse_intent)]
        intents: Vec<(String, String)>,
        /// Subreddit for reddit posts (name, r/name, or URL)
        #[arg(long)]
        subreddit: Option<String>,
        /// Urgency level
        #[arg(long)]
        urgency: Option<String>,
        /// Write the final bundle here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List known platforms
    Platforms,
    /// Show the resolved configuration
    Config,
    /// Check configuration and credentials
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_intent(raw: &str) -> Result<(String, String), String> {
    let (platform, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected platform=value, got '{raw}'"))?;
    let platform = platform.trim();
    if platform.is_empty() || value.trim().is_empty() {
        return Err(format!("expected platform=value, got '{raw}'"));
    }
    Ok((platform.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prfirm=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "prfirm", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Run {
            platforms,
            topic,
            brand_bible,
            intents,
            subreddit,
            urgency,
            output,
        } => {
            let brand_bible = brand_bible
                .map(|path| {
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading brand bible {}", path.display()))
                })
                .transpose()?;
            let request = CampaignRequest {
                platforms,
                topic: topic.unwrap_or_default(),
                intents: intents
                    .into_iter()
                    .map(|(platform, value)| (platform, Intent::parse(&value)))
                    .collect::<BTreeMap<_, _>>(),
                brand_bible,
                subreddit,
                urgency: urgency.unwrap_or_default(),
            };
            run_campaign(&config, request, output.as_deref()).await?;
        }
        Commands::Platforms => {
            let registry = prfirm_core::PlatformRegistry::from_overrides(&config.platforms);
            for spec in registry.iter() {
                let limit = spec
                    .limits
                    .chars
                    .map(|c| format!("{c} chars"))
                    .unwrap_or_else(|| format!("~{} chars", spec.limits.approx_chars));
                let aliases = if spec.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" (aka {})", spec.aliases.join(", "))
                };
                println!(
                    "  {:<10} {}{} [{}] {}; intent: {}",
                    spec.name,
                    spec.display_name(),
                    aliases,
                    spec.structure.join(" > "),
                    limit,
                    spec.default_intent
                );
            }
        }
        Commands::Config => {
            println!("{}", config.to_toml()?);
        }
        Commands::Doctor => {
            doctor::run_doctor(&config);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

async fn run_campaign(
    config: &AppConfig,
    request: CampaignRequest,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let llm = prfirm_llm::create_guarded_client(&config.model, &config.resilience)?;
    let pipeline = Pipeline::new(StageContext::new(llm, config))?;

    let run_id = uuid::Uuid::new_v4();
    let result = pipeline
        .run(SharedState::new(request))
        .instrument(info_span!("campaign", %run_id))
        .await;

    let state = match result {
        Ok(state) => state,
        Err(failure) => {
            eprintln!("Run failed: {}", failure.error);
            eprintln!("Partial state:");
            eprintln!("{}", serde_json::to_string_pretty(&failure.state)?);
            bail!(
                "campaign run {run_id} failed at stage '{}'",
                failure.state.progress.current_stage()
            );
        }
    };

    let json = match &state.final_bundle {
        Some(bundle) => serde_json::to_string_pretty(bundle)?,
        None => serde_json::to_string_pretty(&state)?,
    };
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing bundle to {}", path.display()))?;
            println!("Final bundle written to {}", path.display());
        }
        None => println!("{json}"),
    }
    if state.progress.manual_review_required() {
        eprintln!("Note: revision limit reached; manual review required.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent() {
        assert_eq!(
            parse_intent("linkedin=custom:hiring push"),
            Ok(("linkedin".into(), "custom:hiring push".into()))
        );
        assert!(parse_intent("linkedin").is_err());
        assert!(parse_intent("=auto").is_err());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "prfirm", "run", "-p", "email", "--platform", "x", "--intent", "x=auto", "--topic",
            "Launch",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                platforms,
                intents,
                topic,
                ..
            } => {
                assert_eq!(platforms, vec!["email", "x"]);
                assert_eq!(intents, vec![("x".to_string(), "auto".to_string())]);
                assert_eq!(topic.as_deref(), Some("Launch"));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from("prfirm.toml"));
    }
}
