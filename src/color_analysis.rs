// src/color_analysis.rs
//
// Traffic-light state from raw pixels.
//
// Classifier (single deterministic rule):
//   ratio = (mean_R + ε) / (mean_G + ε)
//   ratio > red_threshold          → RED
//   otherwise mean_G > mean_R      → GREEN
//   otherwise                      → UNKNOWN
//
// Amber is not distinguished; it falls in UNKNOWN or RED depending on the
// lamp's hue and the threshold.

use crate::types::BBox;
use image::RgbImage;
use tracing::debug;

const EPS: f32 = 1e-6;

// ============================================================================
// PUBLIC TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficLightState {
    Red,
    Green,
    Unknown,
}

impl TrafficLightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLightState::Red => "red",
            TrafficLightState::Green => "green",
            TrafficLightState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TrafficLightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of colour analysis on the signal region.
#[derive(Debug, Clone)]
pub struct LightAnalysisResult {
    pub state: TrafficLightState,
    /// (mean_R + ε) / (mean_G + ε)
    pub red_green_ratio: f32,
    pub mean_red: f32,
    pub mean_green: f32,
    /// Pixels inside the clamped region
    pub samples: u32,
}

impl LightAnalysisResult {
    fn unknown() -> Self {
        Self {
            state: TrafficLightState::Unknown,
            red_green_ratio: 0.0,
            mean_red: 0.0,
            mean_green: 0.0,
            samples: 0,
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Classify the signal visible in `roi` of `frame`.
///
/// The region is clamped to the frame; an empty region is `Unknown`.
pub fn classify_traffic_light(frame: &RgbImage, roi: &BBox, red_threshold: f32) -> LightAnalysisResult {
    let (width, height) = frame.dimensions();

    let x1 = (roi[0].max(0.0) as u32).min(width);
    let y1 = (roi[1].max(0.0) as u32).min(height);
    let x2 = (roi[2].max(0.0) as u32).min(width);
    let y2 = (roi[3].max(0.0) as u32).min(height);

    if x2 <= x1 || y2 <= y1 {
        return LightAnalysisResult::unknown();
    }

    let mut sum_r = 0.0f64;
    let mut sum_g = 0.0f64;
    for y in y1..y2 {
        for x in x1..x2 {
            let px = frame.get_pixel(x, y);
            sum_r += px[0] as f64;
            sum_g += px[1] as f64;
        }
    }

    let samples = (x2 - x1) * (y2 - y1);
    let mean_red = (sum_r / samples as f64) as f32;
    let mean_green = (sum_g / samples as f64) as f32;
    let ratio = (mean_red + EPS) / (mean_green + EPS);

    let state = if ratio > red_threshold {
        TrafficLightState::Red
    } else if mean_green > mean_red {
        TrafficLightState::Green
    } else {
        TrafficLightState::Unknown
    };

    debug!(
        "Signal ROI: R={:.1} G={:.1} ratio={:.2} → {}",
        mean_red, mean_green, ratio, state
    );

    LightAnalysisResult {
        state,
        red_green_ratio: ratio,
        mean_red,
        mean_green,
        samples,
    }
}
