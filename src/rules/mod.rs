// src/rules/mod.rs
//
// Violation rules. Each rule owns a private map from track id to a small
// state record and never sees another rule's state.
//
// Signal flow per frame:
//   FrameContext (tracks + side inputs) → rule.update() → EventLog.log()
//
// Rules declare the optional side inputs they need; the orchestrator only
// calls `update` when every declared input is present in the frame.

pub mod helmet;
pub mod lane_invasion;
pub mod red_light;
pub mod speed;

pub use helmet::HelmetRule;
pub use lane_invasion::LaneInvasionRule;
pub use red_light::RedLightRule;
pub use speed::SpeedRule;

use crate::event_log::EventLog;
use crate::pipeline::FrameContext;
use crate::types::{TrackId, ViolationKind};
use anyhow::Result;

/// Optional per-frame channels a rule can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideInput {
    /// Boxes from the helmet detector
    HelmetDetections,
    /// Decoded frame pixels
    FrameImage,
}

impl SideInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            SideInput::HelmetDetections => "helmet_detections",
            SideInput::FrameImage => "frame_image",
        }
    }
}

pub trait ViolationRule {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ViolationKind;

    /// Side inputs that must be present for `update` to run.
    fn required_inputs(&self) -> &'static [SideInput] {
        &[]
    }

    /// Consume one frame. Called once per frame in timestamp order.
    fn update(&mut self, ctx: &FrameContext, log: &mut EventLog) -> Result<()>;

    /// Drop all state kept for `id`.
    fn forget(&mut self, id: TrackId);

    /// Number of ids currently holding state.
    fn tracked_ids(&self) -> usize;
}

/// Cooldown gate shared by the rules: `None` means never reported.
#[inline]
pub(crate) fn cooldown_elapsed(last_report: Option<f64>, now: f64, min_gap: f64) -> bool {
    last_report.map_or(true, |last| now - last >= min_gap)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::event_log::EventLog;
    use crate::pipeline::FrameContext;
    use crate::types::{BBox, ObjectLabel, TrackedObject};

    pub fn temp_log() -> (tempfile::TempDir, EventLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("out"), dir.path().join("out/evidence")).unwrap();
        (dir, log)
    }

    pub fn track(id: u64, label: ObjectLabel, bbox: BBox) -> TrackedObject {
        TrackedObject::new(id, label, bbox)
    }

    /// Box of size `w`×`h` centered on `(cx, cy)`.
    pub fn boxed(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
    }

    /// Object moving from `prev` to `curr` center.
    pub fn moving(id: u64, label: ObjectLabel, prev: (f32, f32), curr: (f32, f32)) -> TrackedObject {
        track(id, label, boxed(curr.0, curr.1, 40.0, 30.0)).with_previous_center(prev)
    }

    pub fn ctx(frame_index: u64, timestamp: f64, tracks: Vec<TrackedObject>) -> FrameContext {
        FrameContext::new(frame_index, timestamp, tracks)
    }
}
