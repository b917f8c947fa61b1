use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use deskbridge::Config;
use deskbridge::HandlerConfig;
use deskbridge::SyncProtocolHandler;
use deskbridge::api;
use deskbridge::endpoint::HttpDeviceEndpoint;
use deskbridge::homegraph::Credentials;
use deskbridge::homegraph::HomeGraphClient;
use deskbridge::logging;
use deskbridge::store::MemoryStore;

const DEFAULT_CONFIG: &str = "deskbridge.toml";

/// Bridge between a smart home assistant and a standing desk
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    // The default path is optional, an explicit one is not
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn load_credentials(key_file: Option<&Path>) -> Option<Credentials> {
    let Some(path) = key_file else {
        tracing::warn!("Service account key is not configured");
        tracing::warn!("Report state will be unavailable");
        return None;
    };

    match Credentials::load(path) {
        Ok(credentials) => {
            tracing::info!("Loaded service account {}", credentials.client_email);
            Some(credentials)
        }
        Err(e) => {
            tracing::warn!("Service account key is not usable: {}", e);
            tracing::warn!("Report state will be unavailable");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init(&config.logging);

    tracing::info!("deskbridge starting");
    tracing::info!("Loaded config from: {}", args.config.display());
    tracing::info!(
        "Bridging device {} at {}",
        config.device.id,
        config.device.endpoint_url
    );

    let credentials = load_credentials(config.assistant.key_file.as_deref());
    let timeout = config.http.timeout();

    let handler_config = HandlerConfig {
        agent_user_id: config.assistant.agent_user_id.clone(),
        devices: vec![config.device.to_device()],
        has_credentials: credentials.is_some(),
    };
    let endpoint = HttpDeviceEndpoint::new(config.device.endpoint_url.clone(), timeout)
        .context("Failed to create device endpoint client")?;
    let platform = HomeGraphClient::new(config.assistant.base_url.clone(), credentials, timeout)
        .context("Failed to create Home Graph client")?;

    let handler = Arc::new(SyncProtocolHandler::new(
        handler_config,
        Arc::new(MemoryStore::new()),
        Arc::new(endpoint),
        Arc::new(platform),
    ));

    let listener = api::spawn_report_state_listener(handler.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server = tokio::spawn(api::serve(
        config.api.listen.clone(),
        config.api.port,
        handler,
        shutdown_rx,
    ));

    tracing::info!("Press Ctrl+C to exit");

    let shutdown_requested = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
            true
        }
        result = &mut server => {
            // The server only stops on its own when it fails to start
            result.context("HTTP API server task panicked")??;
            false
        }
    };

    if shutdown_requested {
        shutdown_tx.send(()).ok();
        server.await.context("HTTP API server task panicked")??;
    }

    listener.abort();
    tracing::info!("deskbridge shutdown complete");

    Ok(())
}
