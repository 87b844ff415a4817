// src/rules/lane_invasion.rs
//
// Vehicles sitting inside the no-cross zone.
//
// Per vehicle:
//   center inside polygon  → inside_frames += 1
//   inside_frames ≥ N, not active, cooldown elapsed → report, mark active
//   center outside         → inside_frames = 0, active = false
//
// `last_report` survives leaving the zone, so a quick exit and re-entry
// waits out the cooldown before reporting again.

use super::{cooldown_elapsed, ViolationRule};
use crate::config::LaneConfig;
use crate::event_log::EventLog;
use crate::geometry::point_in_polygon;
use crate::pipeline::FrameContext;
use crate::types::{Point, TrackId, ViolationKind};
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct ZoneState {
    inside_frames: u32,
    active: bool,
    last_report: Option<f64>,
}

pub struct LaneInvasionRule {
    polygon: Vec<Point>,
    config: LaneConfig,
    vehicles: HashMap<TrackId, ZoneState>,
}

impl LaneInvasionRule {
    pub fn new(polygon: Vec<Point>, config: LaneConfig) -> Self {
        Self {
            polygon,
            config,
            vehicles: HashMap::new(),
        }
    }

    pub fn is_active(&self, id: TrackId) -> bool {
        self.vehicles.get(&id).map_or(false, |s| s.active)
    }
}

impl ViolationRule for LaneInvasionRule {
    fn name(&self) -> &'static str {
        "LaneInvasionRule"
    }

    fn kind(&self) -> ViolationKind {
        ViolationKind::LaneInvasion
    }

    fn update(&mut self, ctx: &FrameContext, log: &mut EventLog) -> Result<()> {
        for vehicle in ctx.vehicles() {
            if !point_in_polygon(vehicle.center(), &self.polygon) {
                if let Some(state) = self.vehicles.get_mut(&vehicle.id) {
                    if state.active {
                        debug!("↩️  #{} left the no-cross zone", vehicle.id);
                    }
                    state.inside_frames = 0;
                    state.active = false;
                }
                continue;
            }

            let state = self.vehicles.entry(vehicle.id).or_default();
            state.inside_frames += 1;

            if state.inside_frames >= self.config.persistence_frames
                && !state.active
                && cooldown_elapsed(state.last_report, ctx.timestamp, self.config.cooldown_seconds)
            {
                log.log(
                    ViolationKind::LaneInvasion,
                    ctx.timestamp,
                    vehicle.id,
                    &vehicle.bbox,
                    serde_json::Map::new(),
                    ctx.image(),
                )?;
                state.active = true;
                state.last_report = Some(ctx.timestamp);
            }
        }

        Ok(())
    }

    fn forget(&mut self, id: TrackId) {
        self.vehicles.remove(&id);
    }

    fn tracked_ids(&self) -> usize {
        self.vehicles.len()
    }
}
