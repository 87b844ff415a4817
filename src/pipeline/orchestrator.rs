// src/pipeline/orchestrator.rs
//
// Drives the registered rules over a stream of frames.
//
// Per frame:
//   1. Reject out-of-order timestamps (the frame is dropped, state untouched)
//   2. CenterHistory → TrackedObject with previous_center
//   3. Each rule whose required side inputs are present runs `update`
//      (a failing rule is logged and counted, the others still run)
//   4. Eviction sweep: ids unseen for > stale_track_frames are forgotten
//
// Rules are chosen once at construction from the config toggles, the scene
// geometry and the side inputs this deployment can provide.

use super::center_history::CenterHistory;
use super::frame_context::FrameContext;
use super::metrics::PipelineMetrics;
use crate::config::{Config, InputsConfig};
use crate::event_log::EventLog;
use crate::rules::{
    HelmetRule, LaneInvasionRule, RedLightRule, SideInput, SpeedRule, ViolationRule,
};
use crate::types::{SideDetection, TrackId, TrackObservation, ViolationEvent};
use anyhow::Result;
use image::RgbImage;
use tracing::{debug, info, warn};

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// One frame of perception output.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub timestamp: f64,
    pub observations: Vec<TrackObservation>,
    pub helmet_detections: Option<Vec<SideDetection>>,
    pub image: Option<RgbImage>,
}

impl FramePayload {
    pub fn new(timestamp: f64, observations: Vec<TrackObservation>) -> Self {
        Self {
            timestamp,
            observations,
            helmet_detections: None,
            image: None,
        }
    }

    pub fn with_helmet_detections(mut self, detections: Vec<SideDetection>) -> Self {
        self.helmet_detections = Some(detections);
        self
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub timestamp: f64,
    pub track_count: usize,
    /// Events logged while processing this frame, in rule order
    pub events: Vec<ViolationEvent>,
    /// Rules skipped because a required side input was missing
    pub skipped_rules: Vec<&'static str>,
    pub failed_rules: Vec<&'static str>,
    pub evicted: Vec<TrackId>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct PipelineOrchestrator {
    rules: Vec<Box<dyn ViolationRule>>,
    history: CenterHistory,
    stale_track_frames: u64,
    next_frame_index: u64,
    last_timestamp: Option<f64>,
    metrics: PipelineMetrics,
}

impl PipelineOrchestrator {
    /// Empty orchestrator; add rules with [`add_rule`](Self::add_rule).
    pub fn new(stale_track_frames: u64) -> Self {
        Self {
            rules: Vec::new(),
            history: CenterHistory::new(),
            stale_track_frames,
            next_frame_index: 0,
            last_timestamp: None,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Side inputs the deployment declares in `inputs`.
    pub fn available_inputs(inputs: &InputsConfig) -> Vec<SideInput> {
        let mut available = Vec::new();
        if inputs.helmet_detections {
            available.push(SideInput::HelmetDetections);
        }
        if inputs.frame_images {
            available.push(SideInput::FrameImage);
        }
        available
    }

    pub fn from_config(config: &Config) -> Self {
        let available = Self::available_inputs(&config.inputs);
        Self::from_config_with_inputs(config, &available)
    }

    /// Register every enabled rule whose geometry is configured and whose
    /// side inputs are in `available`.
    pub fn from_config_with_inputs(config: &Config, available: &[SideInput]) -> Self {
        let mut orchestrator = Self::new(config.engine.stale_track_frames);
        let mut candidates: Vec<Box<dyn ViolationRule>> = Vec::new();

        if config.rules.helmet {
            candidates.push(Box::new(HelmetRule::new(config.helmet.clone())));
        }

        if config.rules.speed {
            match &config.geometry.speed_lines {
                Some(lines) => candidates.push(Box::new(SpeedRule::new(
                    lines.clone(),
                    config.speed.clone(),
                ))),
                None => info!("⏭️  SpeedRule disabled: no speed_lines in geometry"),
            }
        }

        if config.rules.lane_invasion {
            match &config.geometry.no_cross_polygon {
                Some(polygon) if polygon.len() >= 3 => candidates.push(Box::new(
                    LaneInvasionRule::new(polygon.clone(), config.lane.clone()),
                )),
                Some(polygon) => warn!(
                    "⚠️  LaneInvasionRule disabled: no_cross_polygon has {} vertices (need ≥ 3)",
                    polygon.len()
                ),
                None => info!("⏭️  LaneInvasionRule disabled: no no_cross_polygon in geometry"),
            }
        }

        if config.rules.red_light {
            match (&config.geometry.stop_line, &config.traffic_light.roi) {
                (Some(stop_line), Some(roi)) => candidates.push(Box::new(RedLightRule::new(
                    *stop_line,
                    *roi,
                    config.traffic_light.clone(),
                ))),
                _ => info!("⏭️  RedLightRule disabled: needs geometry.stop_line and sem_light.roi"),
            }
        }

        for rule in candidates {
            let missing: Vec<&str> = rule
                .required_inputs()
                .iter()
                .filter(|input| !available.contains(*input))
                .map(|input| input.as_str())
                .collect();

            if missing.is_empty() {
                orchestrator.add_rule(rule);
            } else {
                info!(
                    "⏭️  {} disabled: side input unavailable ({})",
                    rule.name(),
                    missing.join(", ")
                );
            }
        }

        orchestrator
    }

    pub fn add_rule(&mut self, rule: Box<dyn ViolationRule>) {
        info!("✅ Rule registered: {} ({})", rule.name(), rule.kind());
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Ids holding state in each rule.
    pub fn rule_states(&self) -> Vec<(&'static str, usize)> {
        self.rules.iter().map(|r| (r.name(), r.tracked_ids())).collect()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn process_frame(&mut self, payload: FramePayload, log: &mut EventLog) -> Result<FrameSummary> {
        if !payload.timestamp.is_finite() {
            self.metrics.frames_rejected += 1;
            anyhow::bail!("frame timestamp is not finite: {}", payload.timestamp);
        }
        if let Some(last) = self.last_timestamp {
            if payload.timestamp < last {
                self.metrics.frames_rejected += 1;
                anyhow::bail!(
                    "frame timestamp went backwards: {:.3}s after {:.3}s",
                    payload.timestamp,
                    last
                );
            }
        }

        let frame_index = self.next_frame_index;
        let tracks = self.history.annotate(frame_index, payload.observations);
        let ctx = FrameContext {
            frame_index,
            timestamp: payload.timestamp,
            image: payload.image,
            tracks,
            helmet_detections: payload.helmet_detections,
        };

        let first_event = log.len();
        let mut skipped_rules = Vec::new();
        let mut failed_rules = Vec::new();

        for rule in self.rules.iter_mut() {
            if let Some(missing) = rule
                .required_inputs()
                .iter()
                .find(|input| !ctx.has_input(**input))
            {
                debug!(
                    "F{}: {} skipped, no {} on this frame",
                    frame_index,
                    rule.name(),
                    missing.as_str()
                );
                skipped_rules.push(rule.name());
                continue;
            }

            let before = log.len();
            if let Err(e) = rule.update(&ctx, log) {
                warn!("⚠️  F{}: {} failed: {:#}", frame_index, rule.name(), e);
                self.metrics.rule_failures += 1;
                failed_rules.push(rule.name());
            }
            self.metrics
                .record_events(rule.kind(), (log.len() - before) as u64);
        }

        if !skipped_rules.is_empty() {
            self.metrics.frames_missing_inputs += 1;
        }

        let evicted = if self.stale_track_frames > 0 {
            self.history.evict_stale(frame_index, self.stale_track_frames)
        } else {
            Vec::new()
        };
        for id in &evicted {
            for rule in self.rules.iter_mut() {
                rule.forget(*id);
            }
        }
        if !evicted.is_empty() {
            debug!("F{}: evicted stale ids {:?}", frame_index, evicted);
            self.metrics.evicted_tracks += evicted.len() as u64;
        }

        self.next_frame_index += 1;
        self.last_timestamp = Some(ctx.timestamp);
        self.metrics.frames_processed += 1;

        if self.metrics.frames_processed % 300 == 0 {
            info!(
                "📊 F{}: t={:.1}s | tracks={} | known_ids={} | events={} | rule_failures={}",
                frame_index,
                ctx.timestamp,
                ctx.tracks.len(),
                self.history.known_ids(),
                self.metrics.total_events(),
                self.metrics.rule_failures,
            );
        }

        Ok(FrameSummary {
            frame_index,
            timestamp: ctx.timestamp,
            track_count: ctx.tracks.len(),
            events: log.events()[first_event..].to_vec(),
            skipped_rules,
            failed_rules,
            evicted,
        })
    }
}
