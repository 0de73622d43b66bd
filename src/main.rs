use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_mirror::config::AppConfig;
use weather_mirror::fetch::{HttpConfig, HttpTransport, Transport};
use weather_mirror::models::FeedKind;
use weather_mirror::sync::{run_cycles_once, run_feeds, AcquisitionCycle};

#[derive(Parser)]
#[command(name = "weather-mirror")]
#[command(about = "Mirror weather open-data listings into a local date-partitioned store")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./mirror.toml")]
    config: PathBuf,

    /// Storage root (overrides the config file)
    #[arg(long, env = "MIRROR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled feed forever
    Run,

    /// Run one cycle and exit
    Once {
        /// Only this feed (grid, forecast, report); default is every enabled feed
        #[arg(long)]
        feed: Option<FeedKind>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_transport(config: &AppConfig) -> Result<Arc<dyn Transport>> {
    let transport = HttpTransport::new(&HttpConfig {
        timeout: config.fetch_timeout(),
        user_agent: config.fetch.user_agent.clone(),
    })
    .context("Failed to build HTTP client")?;
    Ok(Arc::new(transport))
}

fn build_cycles(
    config: &AppConfig,
    kinds: &[FeedKind],
    transport: Arc<dyn Transport>,
) -> Result<Vec<AcquisitionCycle>> {
    kinds
        .iter()
        .map(|&kind| {
            AcquisitionCycle::from_config(kind, config, transport.clone())
                .with_context(|| format!("Failed to set up {} feed", kind))
        })
        .collect()
}

fn enabled_feeds(config: &AppConfig) -> Result<Vec<FeedKind>> {
    let mut kinds = Vec::new();
    for kind in FeedKind::ALL {
        if config.feed_settings(kind)?.enabled {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }

    // Initialize tracing
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_tracing(level, cli.json_logs);

    tracing::info!("Starting weather-mirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run => {
            config.validate()?;

            let kinds = enabled_feeds(&config)?;
            if kinds.is_empty() {
                tracing::warn!("No feeds enabled, nothing to do");
                return Ok(());
            }

            let transport = build_transport(&config)?;
            let cycles = build_cycles(&config, &kinds, transport)?;

            tracing::info!(
                "Mirroring {} feeds into {:?}",
                cycles.len(),
                config.data_dir()?
            );

            run_feeds(cycles).await.context("Feed stopped on fatal error")?;
        }

        Commands::Once { feed } => {
            config.validate()?;

            let kinds = match feed {
                Some(kind) => vec![kind],
                None => enabled_feeds(&config)?,
            };

            let transport = build_transport(&config)?;
            let cycles = build_cycles(&config, &kinds, transport)?;

            let mut fatal = None;
            println!("\n=== Cycle Results ===");
            for (kind, result) in run_cycles_once(cycles).await {
                match result {
                    Ok(summary) => {
                        println!(
                            "{:<9} targets: {:>5}  stored: {:>5}  skipped: {:>5}  failed: {:>5}  ({:.1}s)",
                            kind.as_str(),
                            summary.targets,
                            summary.stored,
                            summary.skipped,
                            summary.failed,
                            summary.duration.as_secs_f64()
                        );
                    }
                    Err(e) => {
                        println!("{:<9} aborted: {}", kind.as_str(), e);
                        if matches!(e, weather_mirror::sync::SyncError::FatalStorage { .. }) {
                            fatal = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = fatal {
                return Err(e.into());
            }
        }

        Commands::ShowConfig => {
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
