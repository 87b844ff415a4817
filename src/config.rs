// src/config.rs
//
// Scene configuration. Every section and key is optional and falls back to
// the defaults below, so a partial YAML file never fails to load.
//
// A file may name a base file with `include: base.yaml`; the including
// file's top-level sections replace the base's (shallow merge).

use crate::types::{BBox, Line, Point};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rules: RulesConfig,
    pub geometry: GeometryConfig,
    pub helmet: HelmetConfig,
    pub speed: SpeedConfig,
    pub lane: LaneConfig,
    #[serde(rename = "sem_light", alias = "traffic_light")]
    pub traffic_light: TrafficLightConfig,
    pub output: OutputConfig,
    pub engine: EngineConfig,
    pub inputs: InputsConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Rule toggles. A toggled-on rule still needs its geometry to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub helmet: bool,
    pub speed: bool,
    pub lane_invasion: bool,
    pub red_light: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            helmet: true,
            speed: true,
            lane_invasion: true,
            red_light: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub speed_lines: Option<SpeedLines>,
    pub stop_line: Option<Line>,
    pub no_cross_polygon: Option<Vec<Point>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedLines {
    #[serde(rename = "A")]
    pub a: Line,
    #[serde(rename = "B")]
    pub b: Line,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    /// Consecutive frames without helmet before reporting
    #[serde(alias = "min_persistence_frames")]
    pub min_persistence_no_helmet: u32,
    /// Consecutive frames with helmet before the violation is cleared
    pub min_persistence_helmet: u32,
    /// Minimum seconds between two reports of the same person
    pub min_gap_seconds: f64,
    /// Person ↔ motorbike center distance gate (px)
    pub max_person_moto_dist: f32,
    /// Head region = this top fraction of the person bbox
    pub head_roi_top_ratio: f32,
    /// Horizontal margin added on each side of the head region, as a fraction of bbox width
    pub head_margin_ratio: f32,
    pub helmet_iou_thresh: f32,
    pub helmet_conf_min: f32,
}

impl Default for HelmetConfig {
    fn default() -> Self {
        Self {
            min_persistence_no_helmet: 6,
            min_persistence_helmet: 3,
            min_gap_seconds: 3.0,
            max_person_moto_dist: 140.0,
            head_roi_top_ratio: 0.38,
            head_margin_ratio: 0.08,
            helmet_iou_thresh: 0.12,
            helmet_conf_min: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Pixel distance between line A and line B
    pub pixel_distance: f64,
    /// Meters per pixel
    pub k_calibration: f64,
    pub limit_kmh: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            pixel_distance: 100.0,
            k_calibration: 0.1,
            limit_kmh: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub persistence_frames: u32,
    pub cooldown_seconds: f64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            persistence_frames: 5,
            cooldown_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficLightConfig {
    /// Region of the frame holding the signal head
    pub roi: Option<BBox>,
    /// mean(R) / mean(G) above this is red
    pub red_threshold: f32,
    pub cooldown_seconds: f64,
}

impl Default for TrafficLightConfig {
    fn default() -> Self {
        Self {
            roi: None,
            red_threshold: 1.3,
            cooldown_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: String,
    pub evidence_dir: String,
    /// Pixels added around the bbox for the evidence crop
    pub crop_padding: u32,
    /// Reset the ledger and evidence once at startup
    pub clean_previous: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/output".to_string(),
            evidence_dir: "data/output/evidence".to_string(),
            crop_padding: 12,
            clean_previous: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processed frames an id may stay unseen before its rule state is
    /// dropped. Matches the tracker's age-out window. 0 keeps state forever.
    pub stale_track_frames: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_track_frames: 15,
        }
    }
}

/// Which optional perception channels exist for this deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub helmet_detections: bool,
    pub frame_images: bool,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            helmet_detections: true,
            frame_images: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub input_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_dir: "data/sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = load_with_includes(path, 0)?;
        let config: Config = serde_yaml::from_value(value)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(contents).context("invalid configuration")?;
        Ok(config)
    }
}

const MAX_INCLUDE_DEPTH: usize = 8;

fn load_with_includes(path: &Path, depth: usize) -> Result<serde_yaml::Value> {
    if depth > MAX_INCLUDE_DEPTH {
        anyhow::bail!("include chain too deep at {}", path.display());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut value: serde_yaml::Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse YAML in {}", path.display()))?;

    // Empty file
    if value.is_null() {
        return Ok(serde_yaml::Value::Mapping(Default::default()));
    }

    let include = value
        .as_mapping_mut()
        .and_then(|m| m.remove("include"))
        .and_then(|v| v.as_str().map(str::to_owned));

    let Some(include) = include else {
        return Ok(value);
    };

    let base_path = match path.parent() {
        Some(dir) if Path::new(&include).is_relative() => dir.join(&include),
        _ => Path::new(&include).to_path_buf(),
    };
    debug!("Config {} includes {}", path.display(), base_path.display());

    let mut base = load_with_includes(&base_path, depth + 1)?;
    if let (Some(base_map), Some(own_map)) = (base.as_mapping_mut(), value.as_mapping()) {
        for (k, v) in own_map {
            base_map.insert(k.clone(), v.clone());
        }
        Ok(base)
    } else {
        Ok(value)
    }
}
