use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use riskbeacon::config::PipelineProfile;
use riskbeacon::context::PipelineContext;
use riskbeacon::pipeline::{run_replay, run_sentiment, run_vpin};

#[derive(Parser)]
#[command(name = "riskbeacon", about = "Historical market replay and headline sentiment pipeline")]
struct Cli {
    /// Config file, extension optional.
    #[arg(short, long, global = true, default_value = "pipeline_config")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch recent prices and news, then replay them onto the broker.
    Replay {
        /// Replay through an in-process broker instead of RabbitMQ.
        #[arg(long)]
        dry_run: bool,
    },
    /// Classify headlines from the news queue and publish sentiment.
    Sentiment,
    /// Track order-flow toxicity (VPIN) per ticker from the tick queue.
    Vpin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let profile = PipelineProfile::load(&cli.config).map_err(|e| {
        error!("CRITICAL: could not load config '{}': {}", cli.config, e);
        e
    })?;
    let ctx = PipelineContext::new(profile)?;

    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, shutting down...");
            shutdown.cancel();
        }
    });

    match cli.command {
        Command::Replay { dry_run } => {
            run_replay(&ctx, dry_run).await?;
        }
        Command::Sentiment => {
            let stats = run_sentiment(&ctx).await.map_err(|e| {
                error!("CRITICAL: sentiment consumer failed: {:#}", e);
                e
            })?;
            info!("👋 Sentiment consumer stopped after {} messages.", stats.received);
        }
        Command::Vpin => {
            let stats = run_vpin(&ctx).await.map_err(|e| {
                error!("CRITICAL: VPIN consumer failed: {:#}", e);
                e
            })?;
            info!("👋 VPIN consumer stopped after {} ticks.", stats.received);
        }
    }
    Ok(())
}
