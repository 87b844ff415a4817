// src/rules/red_light.rs
//
// Vehicles crossing the stop line while the signal is red.
//
// The signal state is read from the frame pixels inside the configured
// ROI (see `color_analysis`). Only a RED frame can produce events; GREEN
// and UNKNOWN frames are skipped entirely.
//
// Re-reports of the same id need strictly more than `cooldown_seconds`.

use super::{SideInput, ViolationRule};
use crate::color_analysis::{classify_traffic_light, TrafficLightState};
use crate::config::TrafficLightConfig;
use crate::event_log::EventLog;
use crate::geometry::crossed_line;
use crate::pipeline::FrameContext;
use crate::types::{BBox, Line, TrackId, ViolationKind};
use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct RedLightRule {
    stop_line: Line,
    roi: BBox,
    config: TrafficLightConfig,
    last_report: HashMap<TrackId, f64>,
    last_state: TrafficLightState,
}

impl RedLightRule {
    pub fn new(stop_line: Line, roi: BBox, config: TrafficLightConfig) -> Self {
        Self {
            stop_line,
            roi,
            config,
            last_report: HashMap::new(),
            last_state: TrafficLightState::Unknown,
        }
    }

    /// Signal state seen on the last frame that carried pixels.
    pub fn last_state(&self) -> TrafficLightState {
        self.last_state
    }

    fn cooled_down(&self, id: TrackId, now: f64) -> bool {
        self.last_report
            .get(&id)
            .map_or(true, |last| now - last > self.config.cooldown_seconds)
    }
}

impl ViolationRule for RedLightRule {
    fn name(&self) -> &'static str {
        "RedLightRule"
    }

    fn kind(&self) -> ViolationKind {
        ViolationKind::RedLight
    }

    fn required_inputs(&self) -> &'static [SideInput] {
        &[SideInput::FrameImage]
    }

    fn update(&mut self, ctx: &FrameContext, log: &mut EventLog) -> Result<()> {
        let Some(image) = ctx.image() else {
            return Ok(());
        };

        let analysis = classify_traffic_light(image, &self.roi, self.config.red_threshold);
        if analysis.state != self.last_state {
            info!(
                "🚦 Signal {} → {} at {:.3}s (R/G={:.2})",
                self.last_state, analysis.state, ctx.timestamp, analysis.red_green_ratio
            );
            self.last_state = analysis.state;
        }

        if analysis.state != TrafficLightState::Red {
            return Ok(());
        }

        let [p1, p2] = self.stop_line;
        for vehicle in ctx.vehicles() {
            if !crossed_line(vehicle.previous_center, vehicle.center(), p1, p2) {
                continue;
            }
            if !self.cooled_down(vehicle.id, ctx.timestamp) {
                debug!("#{} crossed on red again within cooldown", vehicle.id);
                continue;
            }

            let mut extra = serde_json::Map::new();
            extra.insert(
                "state".to_string(),
                serde_json::json!(TrafficLightState::Red.as_str()),
            );
            log.log(
                ViolationKind::RedLight,
                ctx.timestamp,
                vehicle.id,
                &vehicle.bbox,
                extra,
                Some(image),
            )?;
            self.last_report.insert(vehicle.id, ctx.timestamp);
        }

        Ok(())
    }

    fn forget(&mut self, id: TrackId) {
        self.last_report.remove(&id);
    }

    fn tracked_ids(&self) -> usize {
        self.last_report.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{ctx, moving, temp_log};
    use crate::types::{ObjectLabel, TrackedObject};
    use image::{Rgb, RgbImage};

    const RED: [u8; 3] = [220, 30, 30];
    const GREEN: [u8; 3] = [30, 210, 80];

    fn intersection() -> RedLightRule {
        RedLightRule::new(
            [(0.0, 60.0), (200.0, 60.0)],
            [0.0, 0.0, 10.0, 30.0],
            TrafficLightConfig::default(),
        )
    }

    fn frame(signal: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::from_pixel(200, 120, Rgb([90, 90, 90]));
        for y in 0..30 {
            for x in 0..10 {
                img.put_pixel(x, y, Rgb(signal));
            }
        }
        img
    }

    fn crossing(id: u64) -> TrackedObject {
        moving(id, ObjectLabel::Car, (100.0, 50.0), (100.0, 70.0))
    }

    fn run(rule: &mut RedLightRule, log: &mut EventLog, t: f64, signal: [u8; 3], tracks: Vec<TrackedObject>) {
        let frame = ctx(0, t, tracks).with_image(frame(signal));
        rule.update(&frame, log).unwrap();
    }

    #[test]
    fn test_crossing_on_red_reports_with_evidence() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        run(&mut rule, &mut log, 1.0, RED, vec![crossing(5)]);

        assert_eq!(rule.last_state(), TrafficLightState::Red);
        assert_eq!(log.len(), 1);
        let event = &log.events()[0];
        assert_eq!(event.kind, ViolationKind::RedLight);
        assert_eq!(event.extra["state"], serde_json::json!("red"));
        assert!(!event.full_frame_evidence.is_empty());
        assert!(std::path::Path::new(&event.crop_evidence).exists());
    }

    #[test]
    fn test_crossing_on_green_is_fine() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        run(&mut rule, &mut log, 1.0, GREEN, vec![crossing(5)]);
        assert_eq!(rule.last_state(), TrafficLightState::Green);
        assert!(log.is_empty());
    }

    #[test]
    fn test_stationary_vehicle_on_red_is_fine() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        let waiting = moving(5, ObjectLabel::Car, (100.0, 40.0), (100.0, 45.0));
        run(&mut rule, &mut log, 1.0, RED, vec![waiting]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_cooldown_is_strict() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        run(&mut rule, &mut log, 1.0, RED, vec![crossing(5)]);
        run(&mut rule, &mut log, 2.0, RED, vec![crossing(5)]);
        // Exactly 3.0 s later is still inside the cooldown
        run(&mut rule, &mut log, 4.0, RED, vec![crossing(5)]);
        assert_eq!(log.len(), 1);

        run(&mut rule, &mut log, 4.5, RED, vec![crossing(5)]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_cooldown_is_per_vehicle() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        run(&mut rule, &mut log, 1.0, RED, vec![crossing(5)]);
        run(&mut rule, &mut log, 1.1, RED, vec![crossing(6)]);
        assert_eq!(log.len(), 2);
        assert_eq!(rule.tracked_ids(), 2);
    }

    #[test]
    fn test_pedestrian_crossing_on_red_is_ignored() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        let walker = moving(8, ObjectLabel::Person, (100.0, 50.0), (100.0, 70.0));
        run(&mut rule, &mut log, 1.0, RED, vec![walker]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_frame_without_pixels_is_skipped() {
        let (_dir, mut log) = temp_log();
        let mut rule = intersection();

        rule.update(&ctx(0, 1.0, vec![crossing(5)]), &mut log).unwrap();
        assert!(log.is_empty());
        assert_eq!(rule.last_state(), TrafficLightState::Unknown);
    }
}
