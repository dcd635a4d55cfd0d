use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::colors::SURGE_LEGEND;
use crate::constants::{find_city, find_service_type};
use crate::error::PipelineError;
use crate::pipeline::StatsSnapshot;
use crate::render::layer_feature_collection;
use crate::types::{AppState, HexagonId, Viewport};
use crate::viewport::{FilterState, ViewportCommand};

#[derive(Debug, Deserialize)]
pub(crate) struct SurgeQuery {
    #[serde(default)]
    service_type: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastQuery {
    hexagon: String,
    #[serde(default)]
    service_type: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CityBody {
    city_id: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceTypeBody {
    service_type: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetaResponse {
    api_base_url: String,
    chunk_size: usize,
    dispatch: String,
    horizons: Vec<i64>,
    filters: FilterState,
    city_name: Option<&'static str>,
    service_type_name: Option<&'static str>,
    layer_ready: bool,
    layer_generation: Option<u64>,
    stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct LegendEntry {
    value: f64,
    color: String,
    label: &'static str,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn meta(State(state): State<AppState>) -> Json<MetaResponse> {
    let latest = state.layers.latest().await;
    let settings = state.layers.settings();
    let filters = state.viewport.current();
    Json(MetaResponse {
        api_base_url: state.cfg.api_base_url.clone(),
        chunk_size: settings.plan.chunk_size,
        dispatch: format!("{:?}", settings.plan.strategy),
        horizons: settings.horizons.clone(),
        filters,
        city_name: find_city(filters.city_id).map(|city| city.name),
        service_type_name: find_service_type(filters.service_type).map(|entry| entry.name),
        layer_ready: latest.is_some(),
        layer_generation: latest.map(|layer| layer.generation),
        stats: state.layers.stats(),
    })
}

pub async fn surge(State(state): State<AppState>, Query(query): Query<SurgeQuery>) -> Response {
    let current = state.viewport.current().service_type;
    let service_type = query.service_type.unwrap_or(current);

    match state.layers.load(service_type).await {
        Ok(layer) => {
            let body = layer_feature_collection(&layer);
            state.layers.commit(layer, state.viewport.current().service_type).await;
            (StatusCode::OK, no_store_headers(), Json(body)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Last layer committed for the current filter, without triggering a fetch.
pub async fn latest_layer(State(state): State<AppState>) -> Response {
    match state.layers.latest().await {
        Some(layer) => (
            StatusCode::OK,
            no_store_headers(),
            Json(layer_feature_collection(&layer)),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            no_store_headers(),
            Json(serde_json::json!({ "error": "Layer not loaded yet.", "retryable": true })),
        )
            .into_response(),
    }
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Response {
    let service_type = query
        .service_type
        .unwrap_or_else(|| state.viewport.current().service_type);
    let hexagon = HexagonId::new(query.hexagon);

    match state.layers.forecast_single(&hexagon, service_type).await {
        Ok(records) => (StatusCode::OK, no_store_headers(), Json(records)).into_response(),
        Err(error) => error_response(error),
    }
}

pub async fn legend() -> Json<Vec<LegendEntry>> {
    Json(
        SURGE_LEGEND
            .iter()
            .map(|swatch| LegendEntry {
                value: swatch.value,
                color: swatch.css_color(),
                label: swatch.label,
            })
            .collect(),
    )
}

pub async fn get_viewport(State(state): State<AppState>) -> Json<FilterState> {
    Json(state.viewport.current())
}

pub async fn set_viewport(
    State(state): State<AppState>,
    Json(viewport): Json<Viewport>,
) -> Response {
    apply_command(&state, ViewportCommand::SetViewport { viewport }).await
}

pub async fn select_city(State(state): State<AppState>, Json(body): Json<CityBody>) -> Response {
    apply_command(
        &state,
        ViewportCommand::SelectCity {
            city_id: body.city_id,
        },
    )
    .await
}

pub async fn set_service_type(
    State(state): State<AppState>,
    Json(body): Json<ServiceTypeBody>,
) -> Response {
    apply_command(
        &state,
        ViewportCommand::SetServiceType {
            service_type: body.service_type,
        },
    )
    .await
}

async fn apply_command(state: &AppState, command: ViewportCommand) -> Response {
    match state.viewport.send(command).await {
        Ok(Some(next)) => (StatusCode::OK, Json(next)).into_response(),
        Ok(None) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": "Command rejected.", "state": state.viewport.current() })),
        )
            .into_response(),
        Err(error) => {
            warn!("Viewport update failed: {error:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": error.to_string() })),
            )
                .into_response()
        }
    }
}

pub(crate) fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::InvalidIdentifier { .. } | PipelineError::MalformedPayloadItem { .. } => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::DirectoryFetchFailure(_)
        | PipelineError::ChunkFetchFailure { .. }
        | PipelineError::Backend { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(error: PipelineError) -> Response {
    warn!("Request failed: {error}");
    (
        error_status(&error),
        no_store_headers(),
        Json(serde_json::json!({
            "error": error.to_string(),
            "retryable": error.is_retryable(),
        })),
    )
        .into_response()
}

fn no_store_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers
}
