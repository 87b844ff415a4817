// src/pipeline/mod.rs

pub mod center_history;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

pub use center_history::CenterHistory;
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{FramePayload, FrameSummary, PipelineOrchestrator};
