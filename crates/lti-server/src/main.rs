//! # lti-server
//!
//! LTI 1.3 tool server.
//!
//! This binary provides:
//! - **OIDC login initiation** and **launch validation** against each
//!   registered platform's published keys
//! - **Provisioning** of periods and users from launches, serialized per
//!   external id
//! - **Deep linking** responses signed with the tool key
//! - **Grade passback** through a background delivery worker
//! - **Admin API** for registering platforms and rotating their key URLs

mod api;
mod config;
mod error;
mod launch;
mod login;
mod resolver;
mod sessions;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use lti_net::{ScoreDelivery, TokenValidator};
use lti_shared::TokenSigner;
use lti_store::{Database, SqliteDirectory};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::launch::LaunchOrchestrator;
use crate::resolver::PathResolver;
use crate::sessions::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lti_server=debug,lti_net=debug")),
        )
        .init();

    info!("Starting LTI tool server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let directory = SqliteDirectory::new(Database::open_at(&config.database_path)?);
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let signer = Arc::new(TokenSigner::new(
        config.tool_private_key.as_deref(),
        config.tool_key_id.clone(),
    )?);

    let validator = Arc::new(TokenValidator::new(
        Arc::new(directory.clone()),
        http.clone(),
    ));

    let resolver = PathResolver::new(
        &config.tool_base_url,
        &config.resource_path,
        &config.deep_link_ui_path,
    )?;
    let orchestrator = Arc::new(LaunchOrchestrator::new(
        Arc::new(directory.clone()),
        Arc::new(resolver),
        config.launch_url(),
    ));

    let delivery = Arc::new(ScoreDelivery::new(signer.clone(), http));
    let sessions = SessionStore::new();

    let app_state = AppState {
        config: Arc::new(config.clone()),
        directory,
        validator,
        orchestrator,
        signer,
        delivery: delivery.clone(),
        sessions: sessions.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cleanup (every 5 minutes)
    let idle = config.session_idle;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = sessions.purge_stale(idle).await;
            if purged > 0 {
                let remaining = sessions.len().await;
                tracing::debug!(purged, remaining, "Purged idle sessions");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
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

    delivery.shutdown().await;

    Ok(())
}
