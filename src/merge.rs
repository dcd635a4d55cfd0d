use std::collections::HashMap;

use crate::hex_id::parse_wire_form;
use crate::types::{ForecastResult, HexagonId, HexagonInfo, HexagonWithForecast};

/// Ids that parse join on their numeric value, so `"0613..."` meets `"613..."`.
#[derive(Debug, PartialEq, Eq, Hash)]
enum JoinKey<'a> {
    Cell(u64),
    Raw(&'a str),
}

fn join_key(hexagon: &HexagonId) -> JoinKey<'_> {
    match parse_wire_form(hexagon.as_str()) {
        Ok(value) => JoinKey::Cell(value),
        Err(_) => JoinKey::Raw(hexagon.as_str()),
    }
}

/// Left-joins the directory with fetched forecasts.
///
/// One output row per directory entry, in directory order. Cells without a
/// forecast get zeroed metrics and zero confidence; forecasts for cells the
/// directory does not list are dropped. Duplicate forecast ids: last one wins.
pub fn merge(directory: &[HexagonInfo], forecasts: &[ForecastResult]) -> Vec<HexagonWithForecast> {
    let by_hexagon: HashMap<JoinKey<'_>, &ForecastResult> = forecasts
        .iter()
        .map(|forecast| (join_key(&forecast.hexagon), forecast))
        .collect();

    directory
        .iter()
        .map(|info| match by_hexagon.get(&join_key(&info.hexagon)) {
            Some(forecast) => HexagonWithForecast {
                hexagon: info.hexagon.clone(),
                service_type: info.service_type,
                demand: forecast.demand,
                driver_gap: forecast.driver_gap,
                surge_delta_percent: forecast.surge_delta_percent,
                confidence: forecast.confidence,
            },
            None => no_data(info),
        })
        .collect()
}

fn no_data(info: &HexagonInfo) -> HexagonWithForecast {
    HexagonWithForecast {
        hexagon: info.hexagon.clone(),
        service_type: info.service_type,
        demand: 0.0,
        driver_gap: 0.0,
        surge_delta_percent: 0.0,
        confidence: 0.0,
    }
}
