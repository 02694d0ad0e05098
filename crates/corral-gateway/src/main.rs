//! corral control API server.
//!
//! Serves the HTTP API over a file-backed model store, with the scheduler
//! embedded: placement runs whenever a host fetches its own record.
//!
//! # Environment
//!
//! - `LISTEN_ADDR` (default `0.0.0.0:8080`)
//! - `DATA_DIR` (default `/var/lib/corral`)
//! - `CLIENT_VERSION`: agent version hosts should run
//! - `AUTO_ENLIST_HOSTS`: `enlisted` for newly registered hosts (default `true`)
//! - `AUTO_APPROVE_USERS` (default `false`)
//! - `ONLINE_WINDOW_SECS`: heartbeat freshness window (default `180`)
//! - `AGENT_BINARY`: path of the agent binary served at `/agent/download`

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corral_auth::StoreAuthenticator;
use corral_control::{ControlConfig, ControlPlaneService};
use corral_gateway::{create_router, GatewayConfig, GatewayState};
use corral_scheduler::{PlacementScheduler, SchedulerConfig};
use corral_store::FsStore;

/// Read and parse an environment variable, falling back to `default`.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value for {key}: {raw:?}").into()),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,corral=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting corral control API");

    let mut control_config = ControlConfig::default();
    if let Ok(version) = std::env::var("CLIENT_VERSION") {
        control_config.client_version = version;
    }
    control_config.auto_enlist_hosts = env_or("AUTO_ENLIST_HOSTS", true)?;
    control_config.auto_approve_users = env_or("AUTO_APPROVE_USERS", false)?;

    let scheduler_config = SchedulerConfig {
        online_window_secs: env_or("ONLINE_WINDOW_SECS", 180)?,
    };

    let gateway_config = GatewayConfig {
        listen_addr: env_or("LISTEN_ADDR", GatewayConfig::default().listen_addr)?,
        agent_binary: std::env::var("AGENT_BINARY").ok().map(PathBuf::from),
        ..GatewayConfig::default()
    };
    let data_dir: PathBuf = env_or("DATA_DIR", PathBuf::from("/var/lib/corral"))?;

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %data_dir.display(),
        client_version = %control_config.client_version,
        auto_enlist_hosts = control_config.auto_enlist_hosts,
        online_window_secs = scheduler_config.online_window_secs,
        "Configuration loaded"
    );

    tracing::info!(path = %data_dir.display(), "Opening model store");
    let store = Arc::new(FsStore::open(&data_dir)?);

    let scheduler = Arc::new(PlacementScheduler::new(Arc::clone(&store), scheduler_config));
    let control = Arc::new(ControlPlaneService::new(
        Arc::clone(&store),
        scheduler,
        control_config,
    ));
    let authenticator = Arc::new(StoreAuthenticator::new(store));

    if gateway_config.agent_binary.is_none() {
        tracing::warn!("No AGENT_BINARY set - agent self-update is disabled");
    }

    let listen_addr = gateway_config.listen_addr.clone();
    let app = create_router(GatewayState::new(control, authenticator, gateway_config));

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
