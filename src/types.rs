use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::HttpForecastBackend;
use crate::config::Config;
use crate::pipeline::SurgeLayerService;
use crate::viewport::ViewportHandle;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub layers: Arc<SurgeLayerService<HttpForecastBackend>>,
    pub viewport: ViewportHandle,
}

/// Hexagon identifier in wire form: the decimal digit string sent by the backend.
///
/// Geometry form is derived on demand at the render boundary and never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexagonId(String);

impl HexagonId {
    pub fn new(wire_form: impl Into<String>) -> Self {
        Self(wire_form.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HexagonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HexagonId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HexagonInfo {
    pub hexagon: HexagonId,
    #[serde(default)]
    pub service_type: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub hexagon: HexagonId,
    pub service_type: i64,
    pub horizon_min: i64,
    pub demand: f64,
    pub driver_gap: f64,
    pub surge_delta_percent: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkForecastRequest {
    pub hexagons: Vec<HexagonId>,
    pub service_type: i64,
    pub horizons: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HexagonWithForecast {
    pub hexagon: HexagonId,
    pub service_type: i64,
    pub demand: f64,
    pub driver_gap: f64,
    pub surge_delta_percent: f64,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}
