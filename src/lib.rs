// src/lib.rs

pub mod association;
pub mod color_analysis;
pub mod config;
pub mod event_log;
pub mod geometry;
pub mod pipeline;
pub mod replay;
pub mod rules;
pub mod types;

pub use config::Config;
pub use event_log::EventLog;
pub use pipeline::{FramePayload, FrameSummary, PipelineOrchestrator};
pub use rules::{SideInput, ViolationRule};
pub use types::{ObjectLabel, TrackObservation, TrackedObject, ViolationEvent, ViolationKind};
