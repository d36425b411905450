//! Standalone PPOR server binary.
//!
//! Intended for local development and demos: authentication accepts every
//! token, and all state lives in memory. Production deployments embed
//! [`ppor_server::RollService`] behind a real room authenticator and a
//! persistent store.

use ppor_core::PporConfig;
use ppor_server::service::RoomAuthenticator;
use ppor_server::{
    build_app, AppState, InMemoryChallengeStore, InMemoryRewardLedger, InMemoryRoomHistory,
    RollService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct PermissiveAuthenticator;

impl RoomAuthenticator for PermissiveAuthenticator {
    fn authenticate(&self, _room_id: &str, _user_id: &str, token: &str) -> bool {
        !token.is_empty()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PporConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    warn!("running with the permissive demo authenticator; every non-empty token is accepted");

    let history_window = config.history_window;
    let service = RollService::new(
        config,
        Arc::new(InMemoryChallengeStore::new()),
        Arc::new(PermissiveAuthenticator),
        Arc::new(InMemoryRoomHistory::new(history_window)),
        Arc::new(InMemoryRewardLedger::new()),
    );
    let app = build_app(AppState {
        service: Arc::new(service),
    });

    let addr: SocketAddr = std::env::var("PPOR_LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".into())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ppor-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
