use std::str::FromStr;

use h3o::CellIndex;
use serde_json::{json, Value};
use tracing::debug;

use crate::colors::surge_to_color;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::SurgeLayer;
use crate::types::HexagonWithForecast;
use crate::utils::{format_percent, iso_from_ms};

#[derive(Debug, Default)]
pub struct RenderedCells {
    pub features: Vec<Value>,
    pub skipped: usize,
}

/// Closed polygon ring for a geometry-form id, as `[lng, lat]` pairs.
pub fn cell_ring(geometry_form: &str) -> PipelineResult<Vec<[f64; 2]>> {
    let cell = CellIndex::from_str(geometry_form)
        .map_err(|_| PipelineError::invalid_identifier(geometry_form))?;
    let mut ring: Vec<[f64; 2]> = cell
        .boundary()
        .iter()
        .map(|vertex| {
            [
                vertex.lng_radians().to_degrees(),
                vertex.lat_radians().to_degrees(),
            ]
        })
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    Ok(ring)
}

pub fn cell_feature(row: &HexagonWithForecast) -> PipelineResult<Value> {
    let geometry_form = row.hexagon.geometry_form()?;
    let ring = cell_ring(&geometry_form)?;

    Ok(json!({
        "type": "Feature",
        "id": row.hexagon,
        "geometry": {
            "type": "Polygon",
            "coordinates": [ring],
        },
        "properties": {
            "hexagon": row.hexagon,
            "h3": geometry_form,
            "service_type": row.service_type,
            "fill_color": surge_to_color(row.surge_delta_percent),
            "surge_delta_percent": row.surge_delta_percent,
            "surge": format_percent(row.surge_delta_percent, 1.0, 1),
            "confidence": format_percent(row.confidence, 100.0, 0),
            "demand": format!("{:.1}", row.demand),
            "driver_gap": format!("{:.1}", row.driver_gap),
        },
    }))
}

/// Renders every row that has usable geometry; the rest are counted, not fatal.
pub fn render_cells(rows: &[HexagonWithForecast]) -> RenderedCells {
    let mut rendered = RenderedCells::default();
    for row in rows {
        match cell_feature(row) {
            Ok(feature) => rendered.features.push(feature),
            Err(error) => {
                debug!("Not rendering {}: {error}", row.hexagon);
                rendered.skipped += 1;
            }
        }
    }
    rendered
}

pub fn layer_feature_collection(layer: &SurgeLayer) -> Value {
    let rendered = render_cells(&layer.hexagons);
    json!({
        "type": "FeatureCollection",
        "features": rendered.features,
        "serviceType": layer.service_type,
        "generation": layer.generation,
        "hexagonCount": layer.hexagons.len(),
        "skippedCells": rendered.skipped,
        "complete": layer.is_complete(),
        "totalChunks": layer.total_chunks,
        "failedChunks": layer.failed_chunks,
        "fetchedAt": iso_from_ms(layer.fetched_at_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HexagonId;
    use h3o::{LatLng, Resolution};

    fn tehran_cell() -> CellIndex {
        LatLng::new(35.689, 51.389)
            .expect("valid coordinate")
            .to_cell(Resolution::Eight)
    }

    fn row(hexagon: HexagonId, surge: f64) -> HexagonWithForecast {
        HexagonWithForecast {
            hexagon,
            service_type: 1,
            demand: 12.34,
            driver_gap: -2.0,
            surge_delta_percent: surge,
            confidence: 0.756,
        }
    }

    #[test]
    fn ring_is_closed_and_near_cell() {
        let cell = tehran_cell();
        let ring = cell_ring(&cell.to_string()).unwrap();
        assert_eq!(ring.len(), 7);
        assert_eq!(ring.first(), ring.last());
        for [lng, lat] in &ring {
            assert!((lng - 51.389).abs() < 0.05, "lng {lng}");
            assert!((lat - 35.689).abs() < 0.05, "lat {lat}");
        }
    }

    #[test]
    fn feature_carries_color_and_tooltip_fields() {
        let cell = tehran_cell();
        let wire = HexagonId::new(u64::from(cell).to_string());
        let feature = cell_feature(&row(wire.clone(), 150.0)).unwrap();

        let properties = &feature["properties"];
        assert_eq!(properties["hexagon"], json!(wire.as_str()));
        assert_eq!(properties["h3"], json!(cell.to_string()));
        assert_eq!(properties["fill_color"], json!([227, 26, 28, 200]));
        assert_eq!(properties["surge"], json!("150.0%"));
        assert_eq!(properties["confidence"], json!("76%"));
        assert_eq!(properties["demand"], json!("12.3"));
        assert_eq!(properties["driver_gap"], json!("-2.0"));
    }

    #[test]
    fn unrenderable_rows_are_counted() {
        let valid = HexagonId::new(u64::from(tehran_cell()).to_string());
        let rows = vec![
            row(valid, 0.0),
            row(HexagonId::from("undefined"), 0.0),
            row(HexagonId::from("1"), 0.0),
        ];
        let rendered = render_cells(&rows);
        assert_eq!(rendered.features.len(), 1);
        assert_eq!(rendered.skipped, 2);
    }

    #[test]
    fn collection_reports_partial_layers() {
        let layer = SurgeLayer {
            service_type: 2,
            generation: 7,
            hexagons: vec![row(HexagonId::new(u64::from(tehran_cell()).to_string()), 10.0)],
            total_chunks: 3,
            failed_chunks: 1,
            fetched_at_ms: 0,
        };
        let collection = layer_feature_collection(&layer);
        assert_eq!(collection["complete"], json!(false));
        assert_eq!(collection["hexagonCount"], json!(1));
        assert_eq!(collection["features"].as_array().map(Vec::len), Some(1));
    }
}
