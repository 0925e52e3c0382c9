//! # beeline-server
//!
//! Self-hostable server for the Beeline direct-messaging app.
//!
//! This binary provides:
//! - **Auth**: email/password registration and sign-in, bearer sessions
//! - **Contacts**: the contact-request lifecycle and contact list
//! - **Chat**: two-party message channels with deterministic ids
//! - **Invites**: 24-hour shareable links redeemed at `/invites/{token}`
//! - **REST API** (axum) plus a server-sent-events stream for live updates

mod api;
mod config;
mod error;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use beeline_client::{AuthProvider, Client, EventBus};
use beeline_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,beeline_server=debug")),
        )
        .init();

    info!("Starting Beeline server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Document store (platform data dir unless BEELINE_DB_PATH is set).
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(database));

    // Identity provider and application logic, explicitly wired together.
    let auth = AuthProvider::new(
        Arc::clone(&db),
        config.session_ttl_secs,
        config.registration_open,
    );
    let client = Client::new(Arc::clone(&db), auth, EventBus::new());

    let app_state = AppState {
        client: client.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cleanup (every 10 minutes).
    let auth_handle = client.auth().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            auth_handle.purge_expired_sessions().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
