// src/pipeline/frame_context.rs
//
// Single source of truth for everything known about one frame. Every rule
// reads the same context, so all of them see identical tracks, the same
// previous centers and the same side inputs.

use crate::rules::SideInput;
use crate::types::{SideDetection, TrackedObject};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Position in the processed sequence (0-based, rejected frames excluded)
    pub frame_index: u64,
    /// Video time in seconds
    pub timestamp: f64,
    pub image: Option<RgbImage>,
    pub tracks: Vec<TrackedObject>,
    /// `None` when the helmet channel did not run for this frame,
    /// `Some(empty)` when it ran and found nothing.
    pub helmet_detections: Option<Vec<SideDetection>>,
}

impl FrameContext {
    pub fn new(frame_index: u64, timestamp: f64, tracks: Vec<TrackedObject>) -> Self {
        Self {
            frame_index,
            timestamp,
            image: None,
            tracks,
            helmet_detections: None,
        }
    }

    pub fn with_image(mut self, image: RgbImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_helmet_detections(mut self, detections: Vec<SideDetection>) -> Self {
        self.helmet_detections = Some(detections);
        self
    }

    pub fn has_input(&self, input: SideInput) -> bool {
        match input {
            SideInput::HelmetDetections => self.helmet_detections.is_some(),
            SideInput::FrameImage => self.image.is_some(),
        }
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    /// Helmet boxes, empty when the channel is absent.
    pub fn helmet_detections(&self) -> &[SideDetection] {
        self.helmet_detections.as_deref().unwrap_or(&[])
    }

    /// Tracks whose label is a vehicle class.
    pub fn vehicles(&self) -> impl Iterator<Item = &TrackedObject> + '_ {
        self.tracks.iter().filter(|t| t.label.is_vehicle())
    }
}
