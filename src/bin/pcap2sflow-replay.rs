//! Replay packet captures to an sFlow collector.

use anyhow::{Context, Result};
use clap::Parser;
use pcap2sflow::{Pacing, Pcap2Sflow, ReplayConfig, ReplayError, SessionMode};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay pcap captures as sFlow v5 raw-packet samples over UDP
#[derive(Parser, Debug)]
#[command(name = "pcap2sflow-replay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file to replay; repeat to replay several in order
    #[arg(short = 't', long = "trace", value_name = "FILE", required = true)]
    traces: Vec<PathBuf>,

    /// YAML configuration file; flags below override its values
    #[arg(short = 'c', long, value_name = "YAML")]
    config: Option<PathBuf>,

    /// Soft ceiling on the size of one datagram, in bytes
    #[arg(long, value_name = "N")]
    max_datagram_size: Option<usize>,

    /// Keep at most N bytes of each frame
    #[arg(long, value_name = "N")]
    capture_limit: Option<u32>,

    /// Replay at a fixed rate of N frames per second
    #[arg(long, value_name = "N", conflicts_with = "speed")]
    pps: Option<u32>,

    /// Replay with the capture's own timing, scaled by X
    #[arg(long, value_name = "X")]
    speed: Option<f64>,

    /// Agent address advertised in every datagram
    #[arg(long, value_name = "IP")]
    agent_address: Option<IpAddr>,

    /// Restart sequences for every trace, each under its own sub-agent id
    #[arg(long)]
    independent_sessions: bool,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG applies when unset
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Collector address
    #[arg(value_name = "HOST:PORT")]
    target: String,
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<ReplayConfig> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ReplayConfig::default(),
    };

    if let Some(size) = args.max_datagram_size {
        config.max_datagram_size = size;
    }
    if let Some(limit) = args.capture_limit {
        config.capture_length_limit = Some(limit);
    }
    if let Some(pps) = args.pps {
        config.pacing = Pacing::PacketsPerSecond(pps);
    }
    if let Some(speed) = args.speed {
        config.pacing = Pacing::CaptureTimestamps { speed };
    }
    if args.agent_address.is_some() {
        config.agent_address = args.agent_address;
    }

    config.validate().context("invalid replay settings")?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, flushing and stopping");
            on_signal.cancel();
        }
    });

    let mode =
        if args.independent_sessions { SessionMode::PerTrace } else { SessionMode::Shared };
    let report = Pcap2Sflow::replay_files(&args.traces, &args.target, &config, mode, cancel)
        .await
        .with_context(|| format!("replaying to {}", args.target))?;

    info!(
        "Sent {} datagrams ({} bytes) carrying {} frames{}",
        report.datagrams,
        report.bytes_sent,
        report.frames,
        if report.cancelled { ", interrupted" } else { "" }
    );
    if report.skipped_sends > 0 {
        warn!("{} datagrams could not be sent and were skipped", report.skipped_sends);
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pcap2sflow-replay: {:#}", e);
            if let Some(replay_error) = e.downcast_ref::<ReplayError>() {
                for suggestion in replay_error.recovery_suggestions() {
                    eprintln!("  - {}", suggestion);
                }
            }
            ExitCode::FAILURE
        }
    }
}
