//! `mirage` command-line tool.
//!
//! ```bash
//! mirage process lobby.mp4 --server http://localhost:5328
//! mirage process lobby.mp4 --simulate --delay-secs 1
//! mirage stats lobby.mp4 --at 12.5
//! mirage bitrate lobby.mp4 --at 12.5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirage_client::{
    ClientConfig, CompareSession, MirageClient, ProcessingTrigger, RemoteTrigger, SimulatedTrigger,
};
use mirage_models::{VideoData, VideoKind};

/// Mirage AI: idle-aware CCTV footage compression
#[derive(Parser)]
#[command(name = "mirage")]
#[command(version)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Process a video and compare it with the original
    Process(ProcessArgs),
    /// Show the stats panel for a local video
    Stats(StatsArgs),
    /// Show the bitrate of a local video at a position
    Bitrate(BitrateArgs),
}

/// Arguments for the process command
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Video file to process
    pub file: PathBuf,

    /// Server base URL
    #[arg(long, env = "MIRAGE_SERVER_URL")]
    pub server: Option<String>,

    /// Simulate processing locally instead of uploading
    #[arg(long)]
    pub simulate: bool,

    /// Delay of the simulated processing
    #[arg(long, default_value = "5")]
    pub delay_secs: u64,

    /// Download the processed video here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Playback position for the bitrate readout (seconds)
    #[arg(long, default_value = "0")]
    pub at: f64,
}

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Video file to inspect
    pub file: PathBuf,

    /// Playback position for the bitrate readout (seconds)
    #[arg(long, default_value = "0")]
    pub at: f64,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the bitrate command
#[derive(Args, Debug)]
pub struct BitrateArgs {
    /// Video file to inspect
    pub file: PathBuf,

    /// Playback position (seconds)
    #[arg(long)]
    pub at: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => run_process(args).await,
        Commands::Stats(args) => run_stats(args).await,
        Commands::Bitrate(args) => run_bitrate(args).await,
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mirage_client=info"));

    // Logs go to stderr so panels on stdout stay clean
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
}

async fn run_process(args: ProcessArgs) -> Result<()> {
    let mut session = CompareSession::new();
    session
        .select(&args.file)
        .await
        .with_context(|| format!("Cannot select {}", args.file.display()))?;

    let mut config = ClientConfig::from_env();
    if let Some(server) = &args.server {
        config = config.with_base_url(server.clone());
    }
    let client = MirageClient::new(config)?;

    let trigger: Box<dyn ProcessingTrigger> = if args.simulate {
        Box::new(SimulatedTrigger::new(Duration::from_secs(args.delay_secs)))
    } else {
        Box::new(RemoteTrigger::new(client.clone()))
    };

    info!(file = %args.file.display(), simulate = args.simulate, "Processing");
    let processed = session
        .process(trigger.as_ref())
        .await
        .context("Processing failed")?
        .clone();

    if let Some(original) = session.original() {
        print_panel("Original", &original.reference, &original.data, args.at);
    }
    print_panel("Processed", &processed.reference, &processed.data, args.at);

    if let Some(report) = &processed.report {
        println!(
            "Frames: {} total, {} idle ({:.1}%), {} degraded, {} ms",
            report.frames_total,
            report.frames_idle,
            report.idle_ratio() * 100.0,
            report.frames_degraded,
            report.elapsed_ms
        );
    }

    if let Some(output) = &args.output {
        match &processed.remote_name {
            Some(name) => {
                let bytes = client.download(VideoKind::Processed, name, output).await?;
                info!(output = %output.display(), bytes, "Downloaded processed video");
            }
            None => {
                tokio::fs::copy(&args.file, output)
                    .await
                    .with_context(|| format!("Cannot write {}", output.display()))?;
            }
        }
    }

    Ok(())
}

async fn run_stats(args: StatsArgs) -> Result<()> {
    let data = mirage_media::inspect(&args.file)
        .await
        .with_context(|| format!("Cannot inspect {}", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        print_panel("Video", &args.file.display().to_string(), &data, args.at);
    }
    Ok(())
}

async fn run_bitrate(args: BitrateArgs) -> Result<()> {
    let data = mirage_media::inspect(&args.file)
        .await
        .with_context(|| format!("Cannot inspect {}", args.file.display()))?;
    println!("{} Kbps", data.bitrate_at(args.at));
    Ok(())
}

fn print_panel(title: &str, reference: &str, data: &VideoData, at: f64) {
    println!("== {} ({})", title, reference);
    println!("{}", data.render_panel(at));
    println!();
}
