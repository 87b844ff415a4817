// src/main.rs
//
// Replays recorded perception sessions through the violation rules.
//
//   violation-detection [config.yaml]

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use violation_detection::pipeline::MetricsSummary;
use violation_detection::replay::SessionProcessor;
use violation_detection::{Config, EventLog, ViolationKind};

const DEFAULT_CONFIG: &str = "config.yaml";

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("violation_detection={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Traffic Violation Detection Starting");
    info!("✓ Configuration loaded from {}", config_path);

    let mut event_log = EventLog::from_config(&config.output)?;
    if config.output.clean_previous {
        event_log.reset()?;
    }
    info!("📒 Ledger: {}", event_log.ledger_path().display());

    let processor = SessionProcessor::new(config.clone());
    let sessions = processor.find_session_files()?;

    if sessions.is_empty() {
        error!("No session files found in {}", config.session.input_dir);
        return Ok(());
    }

    info!("Found {} session file(s) to process", sessions.len());

    for (idx, session_path) in sessions.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing session {}/{}: {}",
            idx + 1,
            sessions.len(),
            session_path.display()
        );
        info!("========================================");

        match processor.process_session(session_path, &mut event_log) {
            Ok(summary) => print_summary(&summary),
            Err(e) => error!("Failed to process session: {:#}", e),
        }
    }

    info!(
        "✓ Done. {} event(s) in ledger, {} evidence write failure(s)",
        event_log.len(),
        event_log.evidence_failures()
    );
    Ok(())
}

fn print_summary(summary: &MetricsSummary) {
    info!("✓ Session processed successfully!");
    info!("  Frames processed: {}", summary.frames_processed);
    if summary.frames_rejected > 0 {
        warn!("  ⏪ Frames rejected (out of order): {}", summary.frames_rejected);
    }

    if summary.total_events > 0 {
        warn!("  🚨 VIOLATIONS: {}", summary.total_events);
        for kind in ViolationKind::ALL {
            let count = summary.events_by_kind.get(kind.as_str()).copied().unwrap_or(0);
            if count > 0 {
                warn!("     {}: {}", kind, count);
            }
        }
    } else {
        info!("  🚨 Violations: 0");
    }

    if summary.rule_failures > 0 {
        warn!("  ❌ Rule failures: {}", summary.rule_failures);
    }
    if summary.evidence_failures > 0 {
        warn!("  🖼️  Evidence write failures: {}", summary.evidence_failures);
    }
    info!("  🧹 Stale ids evicted: {}", summary.evicted_tracks);
    info!("  Processing Speed: {:.1} FPS", summary.fps);
}
