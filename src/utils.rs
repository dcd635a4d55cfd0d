use chrono::{DateTime, Utc};

pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .init();
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn iso_from_ms(timestamp_ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|ts| ts.to_rfc3339())
}

/// Formats a tooltip percentage, e.g. `0.8` with `scale = 100.0` -> `"80%"`.
pub fn format_percent(value: f64, scale: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_from_ms_formats_rfc3339() {
        assert_eq!(
            iso_from_ms(0).as_deref(),
            Some("1970-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn format_percent_rounds_to_requested_precision() {
        assert_eq!(format_percent(12.345, 1.0, 1), "12.3%");
        assert_eq!(format_percent(0.756, 100.0, 0), "76%");
    }
}
