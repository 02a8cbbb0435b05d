use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wfd::{LoggingPlayback, SourceConfig, TracingListener, WifiDisplaySource};

#[derive(Parser)]
#[command(
    name = "wfd-source",
    about = "Wi-Fi Display (Miracast) source: RTSP control plane without a media pipeline"
)]
struct Args {
    /// Interface to listen on: ip, ip:port, host or host:port (port defaults to 7236)
    #[arg(long, short, default_value = "0.0.0.0")]
    interface: String,

    /// How often dead connections are reaped, in milliseconds
    #[arg(long, default_value_t = 1000)]
    reaper_interval_ms: u64,

    /// Silence allowed during playback before the sink is probed, in seconds
    #[arg(long, default_value_t = 30)]
    keepalive_timeout_secs: u64,

    /// RTP port reported as server_port in SETUP replies
    #[arg(long, default_value_t = 15550)]
    rtp_port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = SourceConfig {
        reaper_interval: Duration::from_millis(args.reaper_interval_ms.max(1)),
        keepalive_timeout: Duration::from_secs(args.keepalive_timeout_secs),
        session_timeout_secs: args.keepalive_timeout_secs,
        ..SourceConfig::default()
    };
    let source = WifiDisplaySource::new(
        config,
        Arc::new(LoggingPlayback::new(args.rtp_port)),
        Arc::new(TracingListener),
    );

    let addr = match source.start(&args.interface).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Failed to start source: {}", e);
            std::process::exit(1);
        }
    };

    println!("Wi-Fi Display source on {addr}, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
    }

    source.stop().await;
}
