use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::batch::{BatchPlan, DispatchStrategy};
use crate::constants::{
    DEFAULT_API_URL, DEFAULT_BULK_TIMEOUT_SECONDS, DEFAULT_CHUNK_SIZE, DEFAULT_CITY_ID,
    DEFAULT_DIRECTORY_TTL_SECONDS, DEFAULT_FORECAST_TTL_SECONDS, DEFAULT_HORIZON,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUEST_TIMEOUT_SECONDS,
    DEFAULT_SERVICE_TYPE,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub bulk_timeout: Duration,
    pub chunk_size: usize,
    pub dispatch: DispatchStrategy,
    pub horizons: Vec<i64>,
    pub directory_ttl: Duration,
    pub forecast_ttl: Duration,
    pub default_city_id: u32,
    pub default_service_type: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_string("PULSAR_LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let api_base_url = resolve_api_base_url(
            env_optional("PULSAR_API_URL"),
            option_env!("PULSAR_API_URL"),
        );
        let request_timeout = Duration::from_secs(env_u64(
            "PULSAR_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);
        let bulk_timeout = Duration::from_secs(env_u64(
            "PULSAR_BULK_TIMEOUT_SECONDS",
            DEFAULT_BULK_TIMEOUT_SECONDS,
        )?);

        let chunk_size = env_u64("PULSAR_CHUNK_SIZE", DEFAULT_CHUNK_SIZE as u64)? as usize;
        if chunk_size == 0 {
            bail!("PULSAR_CHUNK_SIZE must be at least 1");
        }

        let max_in_flight =
            env_u64("PULSAR_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT as u64)? as usize;
        let dispatch = parse_dispatch(
            &env_string("PULSAR_DISPATCH", "parallel"),
            max_in_flight,
        )?;

        let horizons = match env_optional("PULSAR_HORIZONS") {
            Some(value) => parse_horizons(&value)?,
            None => vec![DEFAULT_HORIZON],
        };

        let directory_ttl = Duration::from_secs(env_u64(
            "PULSAR_DIRECTORY_TTL_SECONDS",
            DEFAULT_DIRECTORY_TTL_SECONDS,
        )?);
        let forecast_ttl = Duration::from_secs(env_u64(
            "PULSAR_FORECAST_TTL_SECONDS",
            DEFAULT_FORECAST_TTL_SECONDS,
        )?);
        let default_city_id = env_u64("PULSAR_DEFAULT_CITY", DEFAULT_CITY_ID as u64)? as u32;
        let default_service_type = env_i64("PULSAR_DEFAULT_SERVICE_TYPE", DEFAULT_SERVICE_TYPE)?;

        Ok(Self {
            listen_addr,
            api_base_url,
            request_timeout,
            bulk_timeout,
            chunk_size,
            dispatch,
            horizons,
            directory_ttl,
            forecast_ttl,
            default_city_id,
            default_service_type,
        })
    }

    pub fn plan(&self) -> BatchPlan {
        BatchPlan {
            chunk_size: self.chunk_size,
            strategy: self.dispatch,
        }
    }
}

/// Runtime value first, then the value baked in at build time, then the local default.
pub fn resolve_api_base_url(runtime: Option<String>, build_time: Option<&str>) -> String {
    let chosen = runtime
        .or_else(|| {
            build_time
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    trim_base_url(&chosen)
}

pub fn parse_dispatch(value: &str, max_in_flight: usize) -> Result<DispatchStrategy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "parallel" => Ok(DispatchStrategy::Parallel { max_in_flight }),
        "sequential" => Ok(DispatchStrategy::Sequential),
        other => bail!("Unknown PULSAR_DISPATCH={other}, expected parallel or sequential"),
    }
}

pub fn parse_horizons(value: &str) -> Result<Vec<i64>> {
    let horizons = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .with_context(|| format!("Failed to parse horizon {entry} as i64"))
        })
        .collect::<Result<Vec<_>>>()?;
    if horizons.is_empty() {
        bail!("PULSAR_HORIZONS must list at least one horizon");
    }
    Ok(horizons)
}

fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_string(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env_optional(name) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {}={} as u64", name, value)),
        None => Ok(default),
    }
}

fn env_i64(name: &str, default: i64) -> Result<i64> {
    match env_optional(name) {
        Some(value) => value
            .parse::<i64>()
            .with_context(|| format!("Failed to parse {}={} as i64", name, value)),
        None => Ok(default),
    }
}
