use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::normalize::{
    normalize, normalize_directory, normalize_payload, DirectoryPayload, Normalized,
};
use crate::types::{BulkForecastRequest, ForecastResult, HexagonId};

/// Client-side contract of the forecasting backend.
pub trait ForecastBackend: Send + Sync {
    fn fetch_hexagons(
        &self,
        service_type: i64,
    ) -> impl Future<Output = PipelineResult<DirectoryPayload>> + Send;

    fn fetch_bulk_forecast(
        &self,
        request: BulkForecastRequest,
    ) -> impl Future<Output = PipelineResult<Normalized>> + Send;

    fn fetch_forecast(
        &self,
        hexagon: &HexagonId,
        service_type: i64,
        horizons: &[i64],
    ) -> impl Future<Output = PipelineResult<Vec<ForecastResult>>> + Send;
}

#[derive(Clone)]
pub struct HttpForecastBackend {
    http: Client,
    base_url: String,
    request_timeout: Duration,
    bulk_timeout: Duration,
}

impl HttpForecastBackend {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
        bulk_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            request_timeout,
            bulk_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ForecastBackend for HttpForecastBackend {
    async fn fetch_hexagons(&self, service_type: i64) -> PipelineResult<DirectoryPayload> {
        let url = hexagons_url(&self.base_url, service_type);
        info!("Fetching hexagons from {url}");

        let payload = send_json(
            self.http.get(&url).timeout(self.request_timeout),
            &url,
        )
        .await?;
        let directory = normalize_directory(payload).map_err(|error| PipelineError::Backend {
            url: url.clone(),
            message: format!("Unexpected hexagon directory shape: {error}"),
        })?;

        info!("Received {} hexagons", directory.entries.len());
        if directory.skipped > 0 {
            warn!(
                "Skipped {} malformed directory entries from {url}",
                directory.skipped
            );
        }
        if let Some(sample) = directory.entries.first() {
            debug!("Sample hexagon: {sample:?}");
        }
        Ok(directory)
    }

    async fn fetch_bulk_forecast(
        &self,
        request: BulkForecastRequest,
    ) -> PipelineResult<Normalized> {
        let url = format!("{}/forecast/bulk", self.base_url);
        debug!(
            "Fetching forecasts for {} hexagons from {url}",
            request.hexagons.len()
        );

        let payload = send_json(
            self.http.post(&url).json(&request).timeout(self.bulk_timeout),
            &url,
        )
        .await?;
        let normalized = normalize_payload(payload);
        if normalized.skipped > 0 {
            warn!(
                "Skipped {} malformed forecast items from {url}",
                normalized.skipped
            );
        }
        Ok(normalized)
    }

    async fn fetch_forecast(
        &self,
        hexagon: &HexagonId,
        service_type: i64,
        horizons: &[i64],
    ) -> PipelineResult<Vec<ForecastResult>> {
        let url = forecast_url(&self.base_url, hexagon, service_type, horizons);
        let payload = send_json(
            self.http.get(&url).timeout(self.request_timeout),
            &url,
        )
        .await?;
        Ok(normalize(payload))
    }
}

async fn send_json(request: RequestBuilder, url: &str) -> PipelineResult<Value> {
    let response = request.send().await.map_err(|error| PipelineError::Backend {
        url: url.to_string(),
        message: error.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::Backend {
            url: url.to_string(),
            message: format!("HTTP {}", response.status()),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|error| PipelineError::Backend {
            url: url.to_string(),
            message: format!("Failed to decode body: {error}"),
        })
}

/// A service type of 0 means "no filter" and is left off the query.
pub fn hexagons_url(base_url: &str, service_type: i64) -> String {
    if service_type == 0 {
        format!("{base_url}/hexagons")
    } else {
        format!("{base_url}/hexagons?service_type={service_type}")
    }
}

pub fn forecast_url(
    base_url: &str,
    hexagon: &HexagonId,
    service_type: i64,
    horizons: &[i64],
) -> String {
    let mut url = format!(
        "{base_url}/forecast?hexagon={}&service_type={service_type}",
        urlencoding::encode(hexagon.as_str())
    );
    for horizon in horizons {
        url.push_str("&horizons=");
        url.push_str(&horizon.to_string());
    }
    url
}
