// src/replay.rs
//
// Recorded perception sessions.
//
// A session file is JSON Lines, one frame per line:
//   {"timestamp": 1.25,
//    "tracks":  [{"id": 7, "label": "car", "bbox": [x1, y1, x2, y2]}],
//    "helmets": [{"bbox": [...], "confidence": 0.8, "label": "helmet"}],   optional
//    "image":   "frames/000031.jpg"}                                       optional
//
// `helmets` absent means the helmet channel did not run on that frame;
// `"helmets": []` means it ran and found nothing. Image paths are relative
// to the session file's directory.

use crate::config::Config;
use crate::event_log::EventLog;
use crate::pipeline::{FramePayload, MetricsSummary, PipelineOrchestrator};
use crate::types::{SideDetection, TrackObservation};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const SESSION_EXTENSIONS: [&str; 2] = ["jsonl", "JSONL"];

/// One line of a session file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    pub timestamp: f64,
    #[serde(default)]
    pub tracks: Vec<TrackObservation>,
    #[serde(default)]
    pub helmets: Option<Vec<SideDetection>>,
    #[serde(default)]
    pub image: Option<String>,
}

pub struct SessionProcessor {
    config: Config,
}

impl SessionProcessor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Every `*.jsonl` under `session.input_dir`, sorted by path.
    pub fn find_session_files(&self) -> Result<Vec<PathBuf>> {
        let input_dir = Path::new(&self.config.session.input_dir);
        if !input_dir.exists() {
            anyhow::bail!("session directory {} does not exist", input_dir.display());
        }

        let mut sessions = Vec::new();
        for entry in WalkDir::new(input_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let is_session = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| SESSION_EXTENSIONS.contains(&ext));
            if is_session {
                sessions.push(path.to_path_buf());
            }
        }

        info!("Found {} session files", sessions.len());
        Ok(sessions)
    }

    pub fn open_session(&self, path: &Path) -> Result<SessionReader> {
        info!("Opening session: {}", path.display());
        SessionReader::open(path, self.config.inputs.frame_images)
    }

    /// Run one session file through a fresh set of rules.
    ///
    /// Events go to the shared ledger, evidence under a directory named after
    /// the session file, and the metrics to `<output_dir>/<stem>_summary.json`.
    pub fn process_session(&self, session_path: &Path, event_log: &mut EventLog) -> Result<MetricsSummary> {
        let mut reader = self.open_session(session_path)?;
        let mut orchestrator = PipelineOrchestrator::from_config(&self.config);
        let evidence_failures_before = event_log.evidence_failures();

        let stem = session_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string());
        event_log.begin_session(stem.as_str());

        if orchestrator.rule_names().is_empty() {
            warn!("⚠️  No rule is active for this configuration; frames will only be counted");
        }

        while let Some(payload) = reader.read_frame()? {
            if let Err(e) = orchestrator.process_frame(payload, event_log) {
                warn!("⚠️  Line {}: frame rejected: {:#}", reader.current_line, e);
            }
        }

        if reader.malformed_lines > 0 {
            warn!("⚠️  {} malformed line(s) skipped", reader.malformed_lines);
        }
        if reader.missing_images > 0 {
            warn!("⚠️  {} frame image(s) could not be loaded", reader.missing_images);
        }

        let summary = orchestrator
            .metrics()
            .summary(event_log.evidence_failures() - evidence_failures_before);

        let summary_path = Path::new(&self.config.output.output_dir).join(format!("{}_summary.json", stem));
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&summary_path, json)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;
        info!("Summary written to {}", summary_path.display());

        Ok(summary)
    }
}

pub struct SessionReader {
    lines: Lines<BufReader<File>>,
    base_dir: PathBuf,
    load_images: bool,
    pub current_line: usize,
    pub frames_read: u64,
    pub malformed_lines: u64,
    pub missing_images: u64,
}

impl SessionReader {
    pub fn open(path: &Path, load_images: bool) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open session {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            lines: BufReader::new(file).lines(),
            base_dir,
            load_images,
            current_line: 0,
            frames_read: 0,
            malformed_lines: 0,
            missing_images: 0,
        })
    }

    /// Next frame, or `None` at end of file.
    ///
    /// Blank lines are skipped. A line that is not a valid record is logged,
    /// counted in `malformed_lines` and skipped. Only I/O errors are returned.
    pub fn read_frame(&mut self) -> Result<Option<FramePayload>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.current_line += 1;
            let line = line.with_context(|| format!("failed to read line {}", self.current_line))?;

            if line.trim().is_empty() {
                continue;
            }

            let record: ReplayRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("⚠️  Line {}: malformed record skipped: {}", self.current_line, e);
                    self.malformed_lines += 1;
                    continue;
                }
            };

            self.frames_read += 1;
            return Ok(Some(self.build_payload(record)));
        }
    }

    fn build_payload(&mut self, record: ReplayRecord) -> FramePayload {
        let mut payload = FramePayload::new(record.timestamp, record.tracks);
        payload.helmet_detections = record.helmets;

        if let (true, Some(rel)) = (self.load_images, record.image.as_deref()) {
            let path = self.base_dir.join(rel);
            match image::open(&path) {
                Ok(img) => payload.image = Some(img.to_rgb8()),
                Err(e) => {
                    warn!("⚠️  Line {}: frame image {} unreadable: {}", self.current_line, path.display(), e);
                    self.missing_images += 1;
                }
            }
        }

        payload
    }
}
