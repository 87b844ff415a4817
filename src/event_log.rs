// src/event_log.rs
//
// Append-only violation ledger plus evidence images.
//
// Layout under the configured directories:
//   <output_dir>/events.csv
//   <evidence_dir>[/<session>]/<kind>/<kind>_id<object_id>_<timestamp_ms>.jpg
//   <evidence_dir>[/<session>]/<kind>/<kind>_id<object_id>_<timestamp_ms>_crop.jpg
//
// Track ids and video time restart with every session, so evidence is kept
// under a per-session directory once a session has been named.
//
// The ledger row is the contract consumed downstream. Evidence is best
// effort: every image write is isolated, a failed artifact leaves its path
// empty and never blocks the row.

use crate::config::OutputConfig;
use crate::geometry::padded_crop_region;
use crate::types::{BBox, TrackId, ViolationEvent, ViolationKind};
use anyhow::{Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LEDGER_FILE_NAME: &str = "events.csv";

pub const LEDGER_HEADER: [&str; 11] = [
    "record_timestamp",
    "kind",
    "video_timestamp_seconds",
    "object_id",
    "x1",
    "y1",
    "x2",
    "y2",
    "full_frame_evidence_path",
    "crop_evidence_path",
    "extra",
];

const DEFAULT_CROP_PADDING: u32 = 12;

/// One ledger row read back from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub record_timestamp: String,
    pub kind: String,
    pub video_timestamp_seconds: String,
    pub object_id: TrackId,
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub full_frame_evidence_path: String,
    pub crop_evidence_path: String,
    pub extra: String,
}

pub struct EventLog {
    ledger_path: PathBuf,
    evidence_dir: PathBuf,
    crop_padding: u32,
    /// Events logged by this instance since open / last reset
    events: Vec<ViolationEvent>,
    evidence_failures: u64,
    /// Evidence subdirectory for the current session
    session: Option<String>,
}

impl EventLog {
    /// Open the ledger, creating directories and the header row if the
    /// ledger is missing or empty. Existing rows are kept.
    pub fn open(output_dir: impl AsRef<Path>, evidence_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        let evidence_dir = evidence_dir.as_ref();

        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        fs::create_dir_all(evidence_dir)
            .with_context(|| format!("failed to create {}", evidence_dir.display()))?;

        let log = Self {
            ledger_path: output_dir.join(LEDGER_FILE_NAME),
            evidence_dir: evidence_dir.to_path_buf(),
            crop_padding: DEFAULT_CROP_PADDING,
            events: Vec::new(),
            evidence_failures: 0,
            session: None,
        };
        log.ensure_header()?;
        Ok(log)
    }

    pub fn from_config(config: &OutputConfig) -> Result<Self> {
        Ok(Self::open(&config.output_dir, &config.evidence_dir)?.with_crop_padding(config.crop_padding))
    }

    pub fn with_crop_padding(mut self, crop_padding: u32) -> Self {
        self.crop_padding = crop_padding;
        self
    }

    /// Evidence logged from now on goes under `<evidence_dir>/<name>/`.
    /// The ledger is shared across sessions.
    pub fn begin_session(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!("Evidence session: {}", name);
        self.session = Some(name);
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Start a fresh run: drop the ledger and all evidence, rewrite the
    /// header. Never called implicitly.
    pub fn reset(&mut self) -> Result<()> {
        remove_if_exists(fs::remove_file(&self.ledger_path))
            .with_context(|| format!("failed to remove {}", self.ledger_path.display()))?;
        remove_if_exists(fs::remove_dir_all(&self.evidence_dir))
            .with_context(|| format!("failed to remove {}", self.evidence_dir.display()))?;

        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.evidence_dir)?;

        self.events.clear();
        self.evidence_failures = 0;
        self.ensure_header()?;

        info!("🧹 Event log reset: {}", self.ledger_path.display());
        Ok(())
    }

    /// Record one violation.
    ///
    /// Always appends a ledger row. With a frame, also writes the full frame
    /// and a padded crop of `bbox` under the kind's evidence directory.
    /// Only a failure to write the ledger row itself is an error.
    pub fn log(
        &mut self,
        kind: ViolationKind,
        timestamp: f64,
        object_id: TrackId,
        bbox: &BBox,
        extra: serde_json::Map<String, serde_json::Value>,
        frame: Option<&RgbImage>,
    ) -> Result<ViolationEvent> {
        let record_timestamp = chrono::Local::now()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();

        let (full_frame_evidence, crop_evidence) = match frame {
            Some(frame) => self.write_evidence(kind, timestamp, object_id, bbox, frame),
            None => (String::new(), String::new()),
        };

        let event = ViolationEvent {
            kind,
            timestamp,
            object_id,
            bbox: *bbox,
            extra,
            full_frame_evidence,
            crop_evidence,
            record_timestamp,
        };

        self.append_row(&event)?;

        warn!(
            "🚨 {} | id={} t={:.3}s bbox=[{:.0},{:.0},{:.0},{:.0}] {}",
            kind.as_str().to_uppercase(),
            object_id,
            timestamp,
            bbox[0],
            bbox[1],
            bbox[2],
            bbox[3],
            serde_json::Value::Object(event.extra.clone()),
        );

        self.events.push(event.clone());
        Ok(event)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn evidence_failures(&self) -> u64 {
        self.evidence_failures
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    /// Load every row of a ledger file.
    pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<LedgerRecord>> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: LedgerRecord = row.with_context(|| format!("malformed row in {}", path.display()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn ensure_header(&self) -> Result<()> {
        let needs_header = match fs::metadata(&self.ledger_path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to stat {}", self.ledger_path.display()))
            }
        };

        if needs_header {
            let mut writer = csv::Writer::from_path(&self.ledger_path)
                .with_context(|| format!("failed to create {}", self.ledger_path.display()))?;
            writer.write_record(LEDGER_HEADER)?;
            writer.flush()?;
            debug!("Ledger header written to {}", self.ledger_path.display());
        }
        Ok(())
    }

    fn append_row(&self, event: &ViolationEvent) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)
            .with_context(|| format!("failed to open {}", self.ledger_path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        let extra = serde_json::to_string(&event.extra)?;

        writer
            .write_record([
                event.record_timestamp.clone(),
                event.kind.as_str().to_string(),
                format!("{:.3}", event.timestamp),
                event.object_id.to_string(),
                (event.bbox[0] as i64).to_string(),
                (event.bbox[1] as i64).to_string(),
                (event.bbox[2] as i64).to_string(),
                (event.bbox[3] as i64).to_string(),
                event.full_frame_evidence.clone(),
                event.crop_evidence.clone(),
                extra,
            ])
            .with_context(|| format!("failed to append to {}", self.ledger_path.display()))?;
        writer.flush()?;
        Ok(())
    }

    /// Returns `(full_frame_path, crop_path)`; a path is empty when its
    /// artifact could not be produced.
    fn write_evidence(
        &mut self,
        kind: ViolationKind,
        timestamp: f64,
        object_id: TrackId,
        bbox: &BBox,
        frame: &RgbImage,
    ) -> (String, String) {
        let dir = match &self.session {
            Some(session) => self.evidence_dir.join(session).join(kind.as_str()),
            None => self.evidence_dir.join(kind.as_str()),
        };
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("⚠️  Evidence directory {} unavailable: {}", dir.display(), e);
            self.evidence_failures += 1;
            return (String::new(), String::new());
        }

        let base = format!("{}_id{}_{}", kind.as_str(), object_id, (timestamp * 1000.0) as i64);
        let full_path = dir.join(format!("{}.jpg", base));
        let crop_path = dir.join(format!("{}_crop.jpg", base));

        let full = match frame.save(&full_path) {
            Ok(()) => display_path(&full_path),
            Err(e) => {
                warn!("⚠️  Failed to write {}: {}", full_path.display(), e);
                self.evidence_failures += 1;
                String::new()
            }
        };

        let (w, h) = frame.dimensions();
        let crop = match padded_crop_region(bbox, self.crop_padding, w, h) {
            Some((x, y, cw, ch)) => {
                let crop = image::imageops::crop_imm(frame, x, y, cw, ch).to_image();
                match crop.save(&crop_path) {
                    Ok(()) => display_path(&crop_path),
                    Err(e) => {
                        warn!("⚠️  Failed to write {}: {}", crop_path.display(), e);
                        self.evidence_failures += 1;
                        String::new()
                    }
                }
            }
            None => {
                debug!("Empty crop for {} id={}, crop evidence skipped", kind, object_id);
                String::new()
            }
        };

        (full, crop)
    }
}

fn remove_if_exists(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
