use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use booking_flow::config::AppConfig;
use booking_flow::handlers;
use booking_flow::services::backend::http::HttpSchedulingBackend;
use booking_flow::services::booking_flow::BookingFlowController;
use booking_flow::services::flow_store::FlowStore;
use booking_flow::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    tracing::info!("using scheduling API at {}", config.scheduling_api_url);
    let backend = HttpSchedulingBackend::new(
        config.scheduling_api_url.clone(),
        config.scheduling_api_token.clone(),
    );

    let flows = BookingFlowController::new(
        Arc::new(backend),
        Arc::new(FlowStore::new()),
        Duration::from_secs(config.settings_cache_ttl_secs),
    )
    .with_max_offered_slots(config.max_offered_slots);

    let state = Arc::new(AppState {
        config: config.clone(),
        flows,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/booking/turn", post(handlers::booking::process_turn))
        .route("/api/booking/flows/:key", get(handlers::booking::get_flow))
        .route(
            "/api/booking/flows/:key/reset",
            post(handlers::booking::reset_flow),
        )
        .route("/api/booking/settings", get(handlers::booking::get_settings))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
