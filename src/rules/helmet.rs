// src/rules/helmet.rs
//
// Motorbike riders without helmet.
//
// Per frame:
//   1. Drop helmet boxes under `helmet_conf_min`
//   2. Pair persons ↔ motorbikes (greedy nearest, distance gate)
//   3. Head region = top slice of the person bbox, widened a little
//   4. Helmet present ⇔ some kept helmet box overlaps the head region
//
// Dual-threshold hysteresis per rider:
//   NO HELMET × min_persistence_no_helmet  → report once, mark active
//   HELMET    × min_persistence_helmet     → clear active (allows a new report)
// The cooldown is a separate gate on top: even after clearing, the same
// rider is not reported again within `min_gap_seconds`.

use super::{cooldown_elapsed, SideInput, ViolationRule};
use crate::association::pair_by_label;
use crate::config::HelmetConfig;
use crate::event_log::EventLog;
use crate::geometry::iou;
use crate::pipeline::FrameContext;
use crate::types::{BBox, ObjectLabel, SideDetection, TrackId, ViolationKind};
use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
struct RiderState {
    /// Consecutive frames without a helmet
    neg_count: u32,
    /// Consecutive frames with a helmet
    pos_count: u32,
    /// Reported and not yet cleared
    active: bool,
    last_report: Option<f64>,
}

pub struct HelmetRule {
    config: HelmetConfig,
    riders: HashMap<TrackId, RiderState>,
}

impl HelmetRule {
    pub fn new(config: HelmetConfig) -> Self {
        Self {
            config,
            riders: HashMap::new(),
        }
    }

    /// Top `head_roi_top_ratio` of the person box, with a horizontal margin
    /// of `head_margin_ratio` × width on each side. Pixel-snapped.
    pub fn head_region(&self, person: &BBox) -> BBox {
        let (x1, y1, x2, y2) = (
            person[0].trunc(),
            person[1].trunc(),
            person[2].trunc(),
            person[3].trunc(),
        );
        let height = (y2 - y1).max(1.0);
        let head_y2 = y1 + (self.config.head_roi_top_ratio * height).trunc();
        let pad_x = (self.config.head_margin_ratio * (x2 - x1)).trunc();
        [x1 - pad_x, y1, x2 + pad_x, head_y2]
    }

    fn wears_helmet(&self, head: &BBox, helmets: &[&SideDetection]) -> bool {
        helmets
            .iter()
            .any(|h| iou(head, &h.bbox) >= self.config.helmet_iou_thresh)
    }

    pub fn is_active(&self, id: TrackId) -> bool {
        self.riders.get(&id).map_or(false, |s| s.active)
    }
}

impl ViolationRule for HelmetRule {
    fn name(&self) -> &'static str {
        "HelmetRule"
    }

    fn kind(&self) -> ViolationKind {
        ViolationKind::NoHelmet
    }

    fn required_inputs(&self) -> &'static [SideInput] {
        &[SideInput::HelmetDetections]
    }

    fn update(&mut self, ctx: &FrameContext, log: &mut EventLog) -> Result<()> {
        let helmets: Vec<&SideDetection> = ctx
            .helmet_detections()
            .iter()
            .filter(|h| h.confidence >= self.config.helmet_conf_min)
            .collect();

        let pairs = pair_by_label(
            &ctx.tracks,
            ObjectLabel::Person,
            ObjectLabel::Motorbike,
            self.config.max_person_moto_dist,
        );

        // First ledger failure of the frame; remaining riders are still evaluated
        let mut failure: Option<anyhow::Error> = None;

        for (person, moto) in pairs {
            let head = self.head_region(&person.bbox);
            let has_helmet = self.wears_helmet(&head, &helmets);

            let need_negative = self.config.min_persistence_no_helmet;
            let need_positive = self.config.min_persistence_helmet;
            let min_gap = self.config.min_gap_seconds;
            let state = self.riders.entry(person.id).or_default();

            if !has_helmet {
                state.neg_count += 1;
                state.pos_count = 0;

                if state.neg_count >= need_negative
                    && !state.active
                    && cooldown_elapsed(state.last_report, ctx.timestamp, min_gap)
                {
                    let mut extra = serde_json::Map::new();
                    extra.insert("moto_id".to_string(), serde_json::json!(moto.id));

                    match log.log(
                        ViolationKind::NoHelmet,
                        ctx.timestamp,
                        person.id,
                        &person.bbox,
                        extra,
                        ctx.image(),
                    ) {
                        Ok(_) => {
                            state.active = true;
                            state.last_report = Some(ctx.timestamp);
                        }
                        Err(e) => {
                            warn!("⚠️  Rider #{}: no-helmet event not recorded: {:#}", person.id, e);
                            failure.get_or_insert(e);
                        }
                    }
                }
            } else {
                state.pos_count += 1;
                state.neg_count = 0;

                if state.pos_count >= need_positive && state.active {
                    state.active = false;
                    debug!(
                        "🪖 Rider #{} wearing helmet for {} frames, violation cleared",
                        person.id, state.pos_count
                    );
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn forget(&mut self, id: TrackId) {
        self.riders.remove(&id);
    }

    fn tracked_ids(&self) -> usize {
        self.riders.len()
    }
}
