// src/types.rs

use serde::{Deserialize, Serialize};

/// Stable identity handed out by the external tracker.
pub type TrackId = u64;

/// Axis-aligned box `[x1, y1, x2, y2]` in frame pixels.
pub type BBox = [f32; 4];

/// Pixel coordinate `(x, y)`.
pub type Point = (f32, f32);

/// Reference line given by two points.
pub type Line = [Point; 2];

// ============================================================================
// LABELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectLabel {
    Person,
    Bicycle,
    Car,
    #[serde(alias = "motorcycle")]
    Motorbike,
    Bus,
    Truck,
    TrafficLight,
    Helmet,
    #[serde(other)]
    Other,
}

impl ObjectLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Bicycle => "bicycle",
            Self::Car => "car",
            Self::Motorbike => "motorbike",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::TrafficLight => "traffic_light",
            Self::Helmet => "helmet",
            Self::Other => "other",
        }
    }

    /// Classes the speed, lane and red-light rules look at.
    pub fn is_vehicle(&self) -> bool {
        matches!(self, Self::Car | Self::Bus | Self::Truck | Self::Motorbike)
    }
}

impl std::fmt::Display for ObjectLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PERCEPTION INPUTS
// ============================================================================

/// Raw tracker output for one object on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackObservation {
    pub id: TrackId,
    pub label: ObjectLabel,
    pub bbox: BBox,
}

/// Tracked object as the rules see it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub id: TrackId,
    pub label: ObjectLabel,
    pub bbox: BBox,
    /// Centroid of the same id on the previous processed frame.
    /// `None` on first appearance or after a gap.
    pub previous_center: Option<Point>,
}

impl TrackedObject {
    pub fn new(id: TrackId, label: ObjectLabel, bbox: BBox) -> Self {
        Self {
            id,
            label,
            bbox,
            previous_center: None,
        }
    }

    pub fn with_previous_center(mut self, center: Point) -> Self {
        self.previous_center = Some(center);
        self
    }

    pub fn center(&self) -> Point {
        crate::geometry::center_of(&self.bbox)
    }
}

/// Per-frame detection from a secondary model (e.g. helmet boxes).
/// Not linked to any track identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideDetection {
    pub bbox: BBox,
    #[serde(alias = "conf")]
    pub confidence: f32,
    #[serde(default = "default_side_label")]
    pub label: String,
}

fn default_side_label() -> String {
    "helmet".to_string()
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoHelmet,
    Overspeed,
    LaneInvasion,
    RedLight,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 4] = [
        ViolationKind::NoHelmet,
        ViolationKind::Overspeed,
        ViolationKind::LaneInvasion,
        ViolationKind::RedLight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHelmet => "no_helmet",
            Self::Overspeed => "overspeed",
            Self::LaneInvasion => "lane_invasion",
            Self::RedLight => "red_light",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reported violation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    /// Video time in seconds
    pub timestamp: f64,
    pub object_id: TrackId,
    pub bbox: BBox,
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Empty when no frame was supplied or the write failed
    pub full_frame_evidence: String,
    pub crop_evidence: String,
    /// Wall clock at logging time, ISO-8601 seconds
    pub record_timestamp: String,
}
