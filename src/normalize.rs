use serde::{de::IgnoredAny, Deserialize};
use serde_json::{Number, Value};
use tracing::debug;

use crate::error::PipelineError;
use crate::types::{ForecastResult, HexagonId, HexagonInfo};

/// Outcome of normalizing one bulk payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Normalized {
    pub records: Vec<ForecastResult>,
    pub skipped: usize,
}

/// Directory entries that decoded, plus the number dropped.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DirectoryPayload {
    pub entries: Vec<HexagonInfo>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct RawDirectoryEntry {
    #[serde(default)]
    hexagon: Option<RawHexagon>,
    #[serde(default)]
    service_type: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
struct RawForecastItem {
    #[serde(default)]
    hexagon: Option<RawHexagon>,
    #[serde(default)]
    service_type: Option<RawNumber>,
    #[serde(default)]
    horizon_min: Option<RawNumber>,
    #[serde(default)]
    demand: Option<RawNumber>,
    #[serde(default)]
    driver_gap: Option<RawNumber>,
    #[serde(default)]
    surge_delta_percent: Option<RawSurgeDelta>,
    #[serde(default)]
    confidence: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHexagon {
    Text(String),
    Number(Number),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
    Flag(bool),
    Other(IgnoredAny),
}

/// Surge encodings the forecast service has used over time, tried in declaration order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSurgeDelta {
    Number(f64),
    Text(String),
    Sequence(Vec<IgnoredAny>),
    Wrapped(WrappedSurgeDelta),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct WrappedSurgeDelta {
    #[serde(default, rename = "parsedValue")]
    parsed_value: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    source: Option<Value>,
}

/// Normalizes a bulk or single forecast payload, dropping the skip count.
pub fn normalize(payload: Value) -> Vec<ForecastResult> {
    normalize_payload(payload).records
}

/// Accepts an array of items or a map of items; anything else yields nothing.
///
/// Items that are not objects or lack a hexagon id are skipped and counted.
pub fn normalize_payload(payload: Value) -> Normalized {
    let items = collection_items(payload).unwrap_or_default();

    let mut normalized = Normalized::default();
    for item in items {
        match normalize_item(item) {
            Ok(record) => normalized.records.push(record),
            Err(error) => {
                debug!("Skipping forecast item: {error}");
                normalized.skipped += 1;
            }
        }
    }
    normalized
}

/// Decodes the hexagon directory entry by entry.
///
/// Entries without a hexagon id are skipped and counted; a missing or
/// non-numeric service type reads as 0. Only a payload that is not a
/// collection at all is an error.
pub fn normalize_directory(payload: Value) -> Result<DirectoryPayload, PipelineError> {
    let kind = json_kind(&payload);
    let items = collection_items(payload).ok_or_else(|| PipelineError::MalformedPayloadItem {
        reason: format!("expected hexagon list, found {kind}"),
    })?;

    let mut directory = DirectoryPayload::default();
    for item in items {
        match directory_entry(item) {
            Ok(entry) => directory.entries.push(entry),
            Err(error) => {
                debug!("Skipping directory entry: {error}");
                directory.skipped += 1;
            }
        }
    }
    Ok(directory)
}

fn collection_items(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => Some(map.into_iter().map(|(_, item)| item).collect()),
        _ => None,
    }
}

fn directory_entry(item: Value) -> Result<HexagonInfo, PipelineError> {
    if !item.is_object() {
        return Err(PipelineError::MalformedPayloadItem {
            reason: format!("expected object, found {}", json_kind(&item)),
        });
    }

    let raw: RawDirectoryEntry =
        serde_json::from_value(item).map_err(|error| PipelineError::MalformedPayloadItem {
            reason: error.to_string(),
        })?;
    let hexagon = raw
        .hexagon
        .and_then(hexagon_from_raw)
        .ok_or_else(|| PipelineError::MalformedPayloadItem {
            reason: "missing hexagon".to_string(),
        })?;

    Ok(HexagonInfo {
        hexagon,
        service_type: coerce_number(raw.service_type.as_ref()) as i64,
    })
}

fn normalize_item(item: Value) -> Result<ForecastResult, PipelineError> {
    if !item.is_object() {
        return Err(PipelineError::MalformedPayloadItem {
            reason: format!("expected object, found {}", json_kind(&item)),
        });
    }

    let raw: RawForecastItem =
        serde_json::from_value(item).map_err(|error| PipelineError::MalformedPayloadItem {
            reason: error.to_string(),
        })?;

    let hexagon = raw
        .hexagon
        .and_then(hexagon_from_raw)
        .ok_or_else(|| PipelineError::MalformedPayloadItem {
            reason: "missing hexagon".to_string(),
        })?;

    Ok(ForecastResult {
        hexagon,
        service_type: coerce_number(raw.service_type.as_ref()) as i64,
        horizon_min: coerce_number(raw.horizon_min.as_ref()) as i64,
        demand: coerce_number(raw.demand.as_ref()),
        driver_gap: coerce_number(raw.driver_gap.as_ref()),
        surge_delta_percent: raw
            .surge_delta_percent
            .as_ref()
            .and_then(surge_from_raw)
            .unwrap_or(0.0),
        confidence: coerce_number(raw.confidence.as_ref()).clamp(0.0, 1.0),
    })
}

fn hexagon_from_raw(raw: RawHexagon) -> Option<HexagonId> {
    match raw {
        RawHexagon::Text(text) if !text.is_empty() => Some(HexagonId::new(text)),
        RawHexagon::Number(number) if number.as_f64() != Some(0.0) => {
            Some(HexagonId::new(number.to_string()))
        }
        _ => None,
    }
}

/// Plain numeric coercion: finite numbers pass, numeric strings parse, everything else is 0.
fn coerce_number(raw: Option<&RawNumber>) -> f64 {
    let value = match raw {
        Some(RawNumber::Number(value)) => *value,
        Some(RawNumber::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(0.0)
            }
        }
        Some(RawNumber::Flag(flag)) => f64::from(u8::from(*flag)),
        Some(RawNumber::Other(_)) | None => 0.0,
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn surge_from_raw(raw: &RawSurgeDelta) -> Option<f64> {
    match raw {
        RawSurgeDelta::Number(value) => Some(*value).filter(|value| value.is_finite()),
        RawSurgeDelta::Text(text) => parse_float_prefix(text),
        RawSurgeDelta::Wrapped(wrapped) => wrapped_candidate(wrapped),
        RawSurgeDelta::Sequence(_) | RawSurgeDelta::Other(_) => None,
    }
}

fn wrapped_candidate(wrapped: &WrappedSurgeDelta) -> Option<f64> {
    let numeric = |value: &Option<Value>| {
        value
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())
    };

    numeric(&wrapped.parsed_value)
        .or_else(|| numeric(&wrapped.value))
        .or_else(|| match wrapped.source.as_ref()? {
            Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
            Value::String(text) => parse_float_prefix(text),
            _ => None,
        })
}

/// Reads the longest leading decimal literal, ignoring trailing text ("42%" reads as 42).
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let integer_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - integer_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut cursor = end + 1;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        mantissa_digits += cursor - (end + 1);
        if mantissa_digits > 0 {
            end = cursor;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut cursor = end + 1;
        if cursor < bytes.len() && matches!(bytes[cursor], b'+' | b'-') {
            cursor += 1;
        }
        let exponent_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor > exponent_start {
            end = cursor;
        }
    }

    trimmed[..end]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
