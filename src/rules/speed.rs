// src/rules/speed.rs
//
// Two-line speed trap.
//
//   crosses A (nothing pending)  → remember t_A
//   crosses B (t_A pending)      → v = k · D / Δt · 3.6  [km/h], drop t_A
//   v > limit                    → report
//
// A and B are checked in that order on the same frame, so an object that
// jumps over both lines between two frames is measured with the floored Δt.
// Crossing A again while a timing is pending keeps the first timestamp.

use super::ViolationRule;
use crate::config::{SpeedConfig, SpeedLines};
use crate::event_log::EventLog;
use crate::geometry::crossed_line;
use crate::pipeline::FrameContext;
use crate::types::{Line, TrackId, ViolationKind};
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

/// Δt floor in seconds
const MIN_ELAPSED: f64 = 1e-6;
const MS_TO_KMH: f64 = 3.6;

pub struct SpeedRule {
    line_a: Line,
    line_b: Line,
    config: SpeedConfig,
    /// id → timestamp of the A crossing
    pending: HashMap<TrackId, f64>,
}

impl SpeedRule {
    pub fn new(lines: SpeedLines, config: SpeedConfig) -> Self {
        Self {
            line_a: lines.a,
            line_b: lines.b,
            config,
            pending: HashMap::new(),
        }
    }

    /// Speed in km/h for an A→B transit lasting `elapsed` seconds.
    pub fn speed_kmh(&self, elapsed: f64) -> f64 {
        let dt = elapsed.max(MIN_ELAPSED);
        self.config.k_calibration * self.config.pixel_distance / dt * MS_TO_KMH
    }

    pub fn is_timing(&self, id: TrackId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl ViolationRule for SpeedRule {
    fn name(&self) -> &'static str {
        "SpeedRule"
    }

    fn kind(&self) -> ViolationKind {
        ViolationKind::Overspeed
    }

    fn update(&mut self, ctx: &FrameContext, log: &mut EventLog) -> Result<()> {
        let [a1, a2] = self.line_a;
        let [b1, b2] = self.line_b;

        for vehicle in ctx.vehicles() {
            let current = vehicle.center();

            if crossed_line(vehicle.previous_center, current, a1, a2)
                && !self.pending.contains_key(&vehicle.id)
            {
                self.pending.insert(vehicle.id, ctx.timestamp);
                debug!("⏱️  #{} crossed line A at {:.3}s", vehicle.id, ctx.timestamp);
            }

            if !crossed_line(vehicle.previous_center, current, b1, b2) {
                continue;
            }
            let Some(started) = self.pending.remove(&vehicle.id) else {
                continue;
            };

            let kmh = self.speed_kmh(ctx.timestamp - started);
            debug!(
                "⏱️  #{} crossed line B, Δt={:.3}s → {:.1} km/h",
                vehicle.id,
                ctx.timestamp - started,
                kmh
            );

            if kmh > self.config.limit_kmh {
                let mut extra = serde_json::Map::new();
                extra.insert(
                    "kmh".to_string(),
                    serde_json::json!((kmh * 10.0).round() / 10.0),
                );
                log.log(
                    ViolationKind::Overspeed,
                    ctx.timestamp,
                    vehicle.id,
                    &vehicle.bbox,
                    extra,
                    ctx.image(),
                )?;
            }
        }

        Ok(())
    }

    fn forget(&mut self, id: TrackId) {
        self.pending.remove(&id);
    }

    fn tracked_ids(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{boxed, ctx, moving, temp_log, track};
    use crate::types::ObjectLabel;

    fn trap(limit_kmh: f64) -> SpeedRule {
        SpeedRule::new(
            SpeedLines {
                a: [(0.0, 100.0), (640.0, 100.0)],
                b: [(0.0, 220.0), (640.0, 220.0)],
            },
            SpeedConfig {
                pixel_distance: 120.0,
                k_calibration: 0.18,
                limit_kmh,
            },
        )
    }

    #[test]
    fn test_overspeed_reported_with_rounded_kmh() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(30.0);

        let at_a = ctx(0, 0.0, vec![moving(7, ObjectLabel::Car, (300.0, 90.0), (300.0, 110.0))]);
        rule.update(&at_a, &mut log).unwrap();
        assert!(rule.is_timing(7));
        assert!(log.is_empty());

        let at_b = ctx(1, 2.0, vec![moving(7, ObjectLabel::Car, (300.0, 210.0), (300.0, 230.0))]);
        rule.update(&at_b, &mut log).unwrap();

        // 0.18 · 120 / 2 · 3.6 = 38.88
        assert_eq!(log.len(), 1);
        let event = &log.events()[0];
        assert_eq!(event.kind, ViolationKind::Overspeed);
        assert_eq!(event.object_id, 7);
        assert_eq!(event.timestamp, 2.0);
        assert_eq!(event.extra["kmh"], serde_json::json!(38.9));
        assert!(!rule.is_timing(7));
    }

    #[test]
    fn test_under_limit_clears_timing_without_event() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(60.0);

        rule.update(&ctx(0, 0.0, vec![moving(7, ObjectLabel::Car, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        rule.update(&ctx(1, 2.0, vec![moving(7, ObjectLabel::Car, (300.0, 210.0), (300.0, 230.0))]), &mut log)
            .unwrap();

        assert!(log.is_empty());
        assert_eq!(rule.tracked_ids(), 0);
    }

    #[test]
    fn test_second_b_crossing_is_noop() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(30.0);

        rule.update(&ctx(0, 0.0, vec![moving(7, ObjectLabel::Car, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        rule.update(&ctx(1, 2.0, vec![moving(7, ObjectLabel::Car, (300.0, 210.0), (300.0, 230.0))]), &mut log)
            .unwrap();
        // Backs over B again
        rule.update(&ctx(2, 2.5, vec![moving(7, ObjectLabel::Car, (300.0, 230.0), (300.0, 210.0))]), &mut log)
            .unwrap();

        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_b_without_a_is_ignored() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(1.0);

        rule.update(&ctx(0, 1.0, vec![moving(3, ObjectLabel::Truck, (300.0, 210.0), (300.0, 230.0))]), &mut log)
            .unwrap();
        assert!(log.is_empty());
        assert!(!rule.is_timing(3));
    }

    #[test]
    fn test_repeated_a_keeps_first_timestamp() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(30.0);

        rule.update(&ctx(0, 0.0, vec![moving(7, ObjectLabel::Car, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        rule.update(&ctx(1, 0.5, vec![moving(7, ObjectLabel::Car, (300.0, 110.0), (300.0, 90.0))]), &mut log)
            .unwrap();
        rule.update(&ctx(2, 1.0, vec![moving(7, ObjectLabel::Car, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        rule.update(&ctx(3, 2.0, vec![moving(7, ObjectLabel::Car, (300.0, 210.0), (300.0, 230.0))]), &mut log)
            .unwrap();

        // Timed from t=0.0, not t=1.0 (which would be 77.8 km/h)
        assert_eq!(log.events()[0].extra["kmh"], serde_json::json!(38.9));
    }

    #[test]
    fn test_both_lines_in_one_step_uses_floored_elapsed() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(60.0);

        rule.update(&ctx(0, 4.0, vec![moving(9, ObjectLabel::Bus, (300.0, 90.0), (300.0, 230.0))]), &mut log)
            .unwrap();

        assert_eq!(log.len(), 1);
        let kmh = log.events()[0].extra["kmh"].as_f64().unwrap();
        assert!(kmh > 1e6);
    }

    #[test]
    fn test_first_appearance_never_crosses() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(1.0);

        rule.update(&ctx(0, 0.0, vec![track(7, ObjectLabel::Car, boxed(300.0, 100.0, 40.0, 30.0))]), &mut log)
            .unwrap();
        assert!(!rule.is_timing(7));
    }

    #[test]
    fn test_non_vehicles_are_not_timed() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(1.0);

        rule.update(&ctx(0, 0.0, vec![moving(4, ObjectLabel::Person, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        assert_eq!(rule.tracked_ids(), 0);
    }

    #[test]
    fn test_motorbike_is_timed() {
        let (_dir, mut log) = temp_log();
        let mut rule = trap(30.0);

        rule.update(&ctx(0, 0.0, vec![moving(5, ObjectLabel::Motorbike, (300.0, 90.0), (300.0, 110.0))]), &mut log)
            .unwrap();
        assert!(rule.is_timing(5));
        rule.forget(5);
        assert!(!rule.is_timing(5));
    }
}
