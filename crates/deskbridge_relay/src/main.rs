use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use deskbridge_relay::create_echo_router;
use deskbridge_relay::create_relay_router;

/// Forward local HTTP traffic to a device on the LAN
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Base URL every request is forwarded to
    #[arg(long, default_value = "http://192.168.86.84:1337")]
    upstream: String,

    /// Address of the relay listener
    #[arg(long, default_value = "0.0.0.0:1337")]
    relay_listen: String,

    /// Address of the echo listener
    #[arg(long, default_value = "0.0.0.0:9000")]
    echo_listen: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let relay_app = create_relay_router(&args.upstream, Duration::from_secs(args.timeout_secs))
        .context("Failed to create relay")?;

    let relay_listener = tokio::net::TcpListener::bind(&args.relay_listen)
        .await
        .with_context(|| format!("Failed to bind relay to {}", args.relay_listen))?;
    let echo_listener = tokio::net::TcpListener::bind(&args.echo_listen)
        .await
        .with_context(|| format!("Failed to bind echo to {}", args.echo_listen))?;

    tracing::info!(
        "Relaying {} -> {}",
        relay_listener.local_addr()?,
        args.upstream
    );
    tracing::info!("Echo listening on {}", echo_listener.local_addr()?);

    let relay = axum::serve(relay_listener, relay_app).into_future();
    let echo = axum::serve(echo_listener, create_echo_router()).into_future();

    tokio::select! {
        result = relay => result.context("Relay server failed")?,
        result = echo => result.context("Echo server failed")?,
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}
