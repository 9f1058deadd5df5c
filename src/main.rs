//! TrendRadar binary: one polling run, then exit.
//!
//! Meant to be invoked periodically by an external scheduler (cron, CI).

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_radar::config::keywords::{load_keyword_groups_from, resolve_keywords_path};
use trend_radar::config::{resolve_config_path, AppConfig};
use trend_radar::error::ConfigError;
use trend_radar::notify::push_record::DEFAULT_RECORDS_DIR;
use trend_radar::pipeline::{DispatchOutcome, Pipeline, RunSummary};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to the keyword-group file
    #[arg(short, long, env = "FREQUENCY_WORDS_PATH")]
    keywords: Option<PathBuf>,

    /// Directory holding the daily push records
    #[arg(long, default_value = DEFAULT_RECORDS_DIR)]
    records_dir: PathBuf,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trend_radar=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        sources = summary.sources,
        failed = summary.failed_ids.len(),
        total_titles = summary.total_titles,
        matched_groups = summary.matched_groups,
        "run summary"
    );
    if !summary.failed_ids.is_empty() {
        tracing::warn!(failed_ids = ?summary.failed_ids, "sources failed this run");
    }
    match &summary.dispatch {
        DispatchOutcome::Dispatched { channels, recorded } => {
            for ch in channels {
                tracing::info!(channel = %ch.channel, outcome = ?ch.outcome, "channel outcome");
            }
            tracing::info!(recorded, "notifications dispatched");
        }
        other => tracing::info!(outcome = ?other, "notifications not dispatched"),
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let config_path = resolve_config_path(cli.config.as_deref());
    let cfg = AppConfig::load_from(&config_path)?;

    let keywords_path = resolve_keywords_path(cli.keywords.as_deref());
    let groups = load_keyword_groups_from(&keywords_path)?;

    let pipeline = Pipeline::from_config(cfg, groups, cli.records_dir)?;
    pipeline.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed arguments");

    match run(cli).await {
        Ok(summary) => {
            log_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(cfg_err) = e.downcast_ref::<ConfigError>() {
                tracing::error!(error = %cfg_err, "configuration error");
                return ExitCode::from(2);
            }
            tracing::error!(error = ?e, "run failed");
            ExitCode::FAILURE
        }
    }
}
