use std::sync::Arc;

use anyhow::Result;
use axum_extra::extract::cookie::Key;
use loginflow::capabilities::memory::{
    InMemoryClientStore, InMemoryHostAuthBridge, InMemoryUserService, TracingEventService,
};
use loginflow::cookies::CookieMessageStore;
use loginflow::view::AskamaViewService;
use loginflow::{web, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting authentication endpoint");

    let config = loginflow::config::Config::load()?;
    tracing::info!(environment = ?config.environment, base_url = %config.base_url, "Configuration loaded");

    let cookie_key = Key::derive_from(config.cookie_signing_key.as_bytes());
    let secure = config.cookie_secure_flag();
    let domain = config.cookie_domain.clone();

    // No real user directory or client registry wired up yet; the
    // in-memory capability implementations keep this endpoint booting and
    // servable until one is.
    let state = AppState {
        config: Arc::new(config.clone()),
        user_service: Arc::new(InMemoryUserService::new()),
        client_store: Arc::new(InMemoryClientStore::new()),
        event_service: Arc::new(TracingEventService::new()),
        view_service: Arc::new(AskamaViewService::new()),
        host_bridge: Arc::new(InMemoryHostAuthBridge::new()),
        sign_in_messages: Arc::new(CookieMessageStore::new("sign_in", domain.clone(), secure)),
        sign_out_messages: Arc::new(CookieMessageStore::new("sign_out", domain.clone(), secure)),
        external_challenges: Arc::new(CookieMessageStore::new("challenge", domain, secure)),
        cookie_key,
    };

    let app = web::create_router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
