use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::backend::ForecastBackend;
use crate::error::{PipelineError, PipelineResult};
use crate::normalize::{normalize_payload, DirectoryPayload, Normalized};
use crate::types::{BulkForecastRequest, ForecastResult, HexagonId, HexagonInfo};

pub const MOCK_SURGE: f64 = 25.0;
pub const MOCK_CONFIDENCE: f64 = 0.75;

/// Distinct wire-form ids, all above 2^53.
pub fn ids(count: usize) -> Vec<HexagonId> {
    (0..count as u64)
        .map(|offset| HexagonId::new((613280337128062975u64 + (offset << 37)).to_string()))
        .collect()
}

pub fn directory(ids: &[HexagonId], service_type: i64) -> Vec<HexagonInfo> {
    ids.iter()
        .map(|hexagon| HexagonInfo {
            hexagon: hexagon.clone(),
            service_type,
        })
        .collect()
}

pub fn forecast(hexagon: &HexagonId, service_type: i64, surge: f64) -> ForecastResult {
    ForecastResult {
        hexagon: hexagon.clone(),
        service_type,
        horizon_min: 30,
        demand: 12.0,
        driver_gap: 4.0,
        surge_delta_percent: surge,
        confidence: MOCK_CONFIDENCE,
    }
}

/// In-memory backend that answers every bulk request with one record per id,
/// plus `garbage_rows` malformed items per chunk.
#[derive(Default)]
pub struct MockBackend {
    directory: Option<Vec<HexagonInfo>>,
    failing_ids: HashSet<HexagonId>,
    garbage_rows: usize,
    directory_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    chunk_sizes: Mutex<Vec<usize>>,
}

impl MockBackend {
    pub fn with_directory(directory: Vec<HexagonInfo>) -> Self {
        Self {
            directory: Some(directory),
            ..Self::default()
        }
    }

    /// Any chunk containing `hexagon` fails as a whole.
    pub fn failing_on(mut self, hexagon: HexagonId) -> Self {
        self.failing_ids.insert(hexagon);
        self
    }

    pub fn with_garbage_rows(mut self, rows: usize) -> Self {
        self.garbage_rows = rows;
        self
    }

    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunk_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }
}

impl ForecastBackend for MockBackend {
    async fn fetch_hexagons(&self, _service_type: i64) -> PipelineResult<DirectoryPayload> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        let entries = self.directory.clone().ok_or_else(|| PipelineError::Backend {
            url: "mock://hexagons".to_string(),
            message: "HTTP 503 Service Unavailable".to_string(),
        })?;
        Ok(DirectoryPayload {
            entries,
            skipped: 0,
        })
    }

    async fn fetch_bulk_forecast(
        &self,
        request: BulkForecastRequest,
    ) -> PipelineResult<Normalized> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.chunk_sizes.lock() {
            sizes.push(request.hexagons.len());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request
            .hexagons
            .iter()
            .any(|hexagon| self.failing_ids.contains(hexagon))
        {
            return Err(PipelineError::Backend {
                url: "mock://forecast/bulk".to_string(),
                message: "operation timed out".to_string(),
            });
        }

        let mut items: Vec<Value> = request
            .hexagons
            .iter()
            .map(|hexagon| json!(forecast(hexagon, request.service_type, MOCK_SURGE)))
            .collect();
        items.extend((0..self.garbage_rows).map(|_| json!({ "demand": 1.0 })));
        Ok(normalize_payload(Value::Array(items)))
    }

    async fn fetch_forecast(
        &self,
        hexagon: &HexagonId,
        service_type: i64,
        _horizons: &[i64],
    ) -> PipelineResult<Vec<ForecastResult>> {
        Ok(vec![forecast(hexagon, service_type, MOCK_SURGE)])
    }
}
