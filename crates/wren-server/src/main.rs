mod configuration;
mod error;
mod routes;
mod state;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use wren::providers::factory;
use wren::relay::RelayService;

use configuration::Settings;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let settings = Settings::new()?;
    let addr = settings.server.socket_addr();
    let model = settings.provider.model().to_string();

    let provider = factory::get_provider(settings.provider.into_config())?;
    let state = AppState::new(RelayService::new(provider), model.clone());

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {} (model: {})", listener.local_addr()?, model);
    axum::serve(listener, app).await?;
    Ok(())
}
