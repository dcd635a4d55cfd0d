use crate::constants::{HEXAGON_FILL_ALPHA, SURGE_DOMAIN_MIN, SURGE_DOMAIN_SPAN};

pub type Rgba = [u8; 4];

// Teal (oversupply) through red (undersupply).
const TEAL: [u8; 3] = [65, 182, 196];
const LIGHT_GREEN: [u8; 3] = [127, 205, 187];
const YELLOW_GREEN: [u8; 3] = [199, 233, 180];
const YELLOW: [u8; 3] = [255, 237, 111];
const ORANGE: [u8; 3] = [254, 178, 76];
const RED_ORANGE: [u8; 3] = [252, 78, 42];
const RED: [u8; 3] = [227, 26, 28];

/// Upper (exclusive) normalized bound of each bucket but the last.
const BUCKETS: [(f64, [u8; 3]); 6] = [
    (0.2, TEAL),
    (0.4, LIGHT_GREEN),
    (0.5, YELLOW_GREEN),
    (0.6, YELLOW),
    (0.7, ORANGE),
    (0.85, RED_ORANGE),
];

#[derive(Clone, Copy, Debug)]
pub struct LegendSwatch {
    pub value: f64,
    pub rgb: [u8; 3],
    pub label: &'static str,
}

impl LegendSwatch {
    pub fn css_color(&self) -> String {
        let [r, g, b] = self.rgb;
        format!("rgb({r}, {g}, {b})")
    }
}

pub const SURGE_LEGEND: [LegendSwatch; 6] = [
    LegendSwatch { value: -20.0, rgb: TEAL, label: "-20%" },
    LegendSwatch { value: 0.0, rgb: LIGHT_GREEN, label: "0%" },
    LegendSwatch { value: 20.0, rgb: YELLOW_GREEN, label: "20%" },
    LegendSwatch { value: 40.0, rgb: YELLOW, label: "40%" },
    LegendSwatch { value: 60.0, rgb: ORANGE, label: "60%" },
    LegendSwatch { value: 80.0, rgb: RED, label: "80%+" },
];

/// Maps surge delta percent onto [0, 1], clamping outside -20..80. NaN maps to 0.
pub fn normalize_surge(surge_delta_percent: f64) -> f64 {
    let normalized = (surge_delta_percent - SURGE_DOMAIN_MIN) / SURGE_DOMAIN_SPAN;
    if normalized.is_nan() {
        return 0.0;
    }
    normalized.clamp(0.0, 1.0)
}

pub fn bucket_index(surge_delta_percent: f64) -> usize {
    let normalized = normalize_surge(surge_delta_percent);
    BUCKETS
        .iter()
        .position(|(upper, _)| normalized < *upper)
        .unwrap_or(BUCKETS.len())
}

pub fn surge_to_color(surge_delta_percent: f64) -> Rgba {
    let [r, g, b] = match BUCKETS.get(bucket_index(surge_delta_percent)) {
        Some((_, rgb)) => *rgb,
        None => RED,
    };
    [r, g, b, HEXAGON_FILL_ALPHA]
}
