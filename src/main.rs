//! Deal Channel Forwarder
//!
//! Reposts shopping deals from source channels to one destination channel.

use chrono::{Offset, Timelike, Utc};
use clap::{Parser, Subcommand};
use deal_forwarder::{
    client::{Transport, WahaClient},
    config::Config,
    governor::RateGovernor,
    ingester::DealParser,
    monitor::{dashboard::DashboardSettings, start_dashboard, DashboardState, ForwarderStats},
    orchestrator::Orchestrator,
};
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "deal-forwarder")]
#[command(about = "Forward deals from WhatsApp channels with affiliate links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forwarder and the status server
    Run,
    /// Parse one message and print the post it would become
    Parse {
        /// Message text; read from stdin when omitted
        text: Option<String>,
        /// Local hour used for hashtags
        #[arg(long)]
        hour: Option<u32>,
    },
    /// Probe the gateway
    Health,
    /// Print recent messages of a channel
    Channels {
        /// Channel id; every configured source when omitted
        channel: Option<String>,
        /// Number of messages to fetch
        #[arg(short, long, default_value = "6")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_forwarder(Config::load(&cli.config)?).await,
        Commands::Parse { text, hour } => parse_message(Config::load_unchecked(&cli.config)?, text, hour),
        Commands::Health => check_health(Config::load_unchecked(&cli.config)?).await,
        Commands::Channels { channel, limit } => {
            show_channels(Config::load_unchecked(&cli.config)?, channel, limit).await
        }
    }
}

async fn run_forwarder(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting deal forwarder");

    let transport: Arc<dyn Transport> = Arc::new(WahaClient::new(&config.gateway)?);
    let parser = Arc::new(DealParser::from_config(&config.parser, &config.affiliate));
    let governor = Arc::new(RateGovernor::new(config.limits.clone()));
    let stats = Arc::new(ForwarderStats::new());

    if config.dashboard.enabled {
        let state = Arc::new(DashboardState {
            stats: stats.clone(),
            governor: governor.clone(),
            settings: DashboardSettings::from_config(&config),
        });
        let port = config.dashboard.port;
        tokio::spawn(async move {
            if let Err(e) = start_dashboard(state, port).await {
                tracing::error!("Status server error: {}", e);
            }
        });
    }

    tracing::info!(
        sources = config.channels.sources.len(),
        max_daily = config.limits.max_daily,
        max_hourly = config.limits.max_hourly,
        min_send_delay_secs = config.limits.min_send_delay_secs,
        "Limits configured"
    );

    let orchestrator = Orchestrator::new(&config, transport, parser, governor, stats);

    tokio::select! {
        _ = orchestrator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

fn parse_message(config: Config, text: Option<String>, hour: Option<u32>) -> anyhow::Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if config.affiliate.amazon_tag.is_empty() {
        tracing::warn!("affiliate.amazon_tag is not set, Amazon links get an empty tag");
    }

    let parser = DealParser::from_config(&config.parser, &config.affiliate);
    let hour = hour.unwrap_or_else(|| {
        let offset = chrono::FixedOffset::east_opt(config.parser.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).hour()
    });

    match parser.parse_with(&text, hour, 0) {
        Ok(deal) => {
            println!("{}", deal.rendered_text);
            println!();
            println!("platform:   {}", deal.platform);
            println!("url:        {}", deal.url);
            if let Some(id) = &deal.product_id {
                println!("product id: {}", id);
            }
        }
        Err(reason) => println!("Rejected: {}", reason),
    }
    Ok(())
}

async fn check_health(config: Config) -> anyhow::Result<()> {
    let client = WahaClient::new(&config.gateway)?;
    if client.health_check().await {
        println!("Gateway at {} is healthy", config.gateway.url);
        Ok(())
    } else {
        anyhow::bail!("Gateway at {} is not healthy", config.gateway.url)
    }
}

async fn show_channels(config: Config, channel: Option<String>, limit: usize) -> anyhow::Result<()> {
    let client = WahaClient::new(&config.gateway)?;
    let channels = match channel {
        Some(channel) => vec![channel],
        None => config.channels.sources.clone(),
    };
    if channels.is_empty() {
        anyhow::bail!("No channel given and channels.sources is empty");
    }

    for channel in channels {
        println!("=== {} ===", config.channels.label_for(&channel));
        match client.fetch_recent(&channel, limit).await {
            Ok(mut messages) => {
                messages.sort_by_key(|m| m.timestamp);
                for msg in messages {
                    let preview: String = msg.body.chars().take(80).collect();
                    println!(
                        "{} {}{}",
                        msg.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        if msg.from_self { "[own] " } else { "" },
                        preview.replace('\n', " ")
                    );
                }
            }
            Err(e) => println!("  fetch failed: {}", e),
        }
    }
    Ok(())
}
