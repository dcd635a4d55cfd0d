mod api;
mod backend;
mod batch;
mod colors;
mod config;
mod constants;
mod error;
mod hex_id;
mod merge;
mod normalize;
mod pipeline;
mod refresh;
mod render;
#[cfg(test)]
mod testing;
mod types;
mod utils;
mod viewport;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Client;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{
    forecast, get_viewport, healthz, latest_layer, legend, meta, select_city, set_service_type,
    set_viewport, surge,
};
use crate::backend::HttpForecastBackend;
use crate::config::Config;
use crate::pipeline::{LayerSettings, SurgeLayerService};
use crate::refresh::spawn_background_workers;
use crate::types::AppState;
use crate::utils::init_tracing;
use crate::viewport::{spawn_viewport_task, FilterState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);

    let http = Client::builder()
        .user_agent("pulsar-surge/1.0")
        .build()
        .context("Failed to build reqwest client")?;
    let backend = HttpForecastBackend::new(
        http,
        cfg.api_base_url.clone(),
        cfg.request_timeout,
        cfg.bulk_timeout,
    );
    info!("Forecast backend at {}", backend.base_url());

    let layers = Arc::new(SurgeLayerService::new(
        backend,
        LayerSettings {
            plan: cfg.plan(),
            horizons: cfg.horizons.clone(),
            directory_ttl: cfg.directory_ttl,
            forecast_ttl: cfg.forecast_ttl,
        },
    ));
    let viewport = spawn_viewport_task(FilterState::initial(
        cfg.default_city_id,
        cfg.default_service_type,
    ));

    let state = AppState {
        cfg: cfg.clone(),
        layers,
        viewport,
    };
    spawn_background_workers(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/meta", get(meta))
        .route("/v1/surge", get(surge))
        .route("/v1/layer", get(latest_layer))
        .route("/v1/forecast", get(forecast))
        .route("/v1/legend", get(legend))
        .route("/v1/viewport", get(get_viewport).post(set_viewport))
        .route("/v1/city", post(select_city))
        .route("/v1/service-type", post(set_service_type))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

    info!("Surge forecast service listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("Surge forecast service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
