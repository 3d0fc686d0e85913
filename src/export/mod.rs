//! Export persistence.
//!
//! Committed transfers land here: the coordinator writes the decoded bytes
//! into the export directory under a timestamped name (so successive
//! exports never overwrite each other) and records the completion with the
//! notification aggregator.

pub mod notify;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::bridge::SaveKind;
use notify::ExportAggregator;

/// An export completion fact queued for aggregated notification.
#[derive(Debug, Clone)]
pub struct ExportRecord {
    pub kind: SaveKind,
    pub path: PathBuf,
}

/// Writes exports and feeds the aggregator.
#[derive(Clone)]
pub struct ExportCoordinator {
    dir: PathBuf,
    aggregator: Arc<ExportAggregator>,
}

impl ExportCoordinator {
    pub fn new(dir: PathBuf, aggregator: Arc<ExportAggregator>) -> Self {
        Self { dir, aggregator }
    }

    /// Write one export. Creates the export directory if absent.
    pub fn write(&self, kind: SaveKind, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating export dir {}", self.dir.display()))?;

        let file_name = timestamped_name(name, Local::now());
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("writing export {}", path.display()))?;

        crate::debug!("export"; "wrote {} ({} bytes)", path.display(), bytes.len());
        self.aggregator.record(ExportRecord {
            kind,
            path: path.clone(),
        });
        Ok(path)
    }
}

/// Insert a timestamp before the extension: `chart.svg` becomes
/// `chart-20260807-141502.svg`.
pub fn timestamped_name(name: &str, ts: DateTime<Local>) -> String {
    let stamp = ts.format("%Y%m%d-%H%M%S");
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => format!("{base}-{stamp}.{ext}"),
        _ => format!("{name}-{stamp}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    fn fixed_ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 7, 14, 15, 2).unwrap()
    }

    #[test]
    fn test_timestamped_name_inserts_before_extension() {
        assert_eq!(
            timestamped_name("chart.svg", fixed_ts()),
            "chart-20260807-141502.svg"
        );
        assert_eq!(
            timestamped_name("report.junit.json", fixed_ts()),
            "report.junit-20260807-141502.json"
        );
    }

    #[test]
    fn test_timestamped_name_without_extension() {
        assert_eq!(
            timestamped_name("snapshot", fixed_ts()),
            "snapshot-20260807-141502"
        );
    }

    #[tokio::test]
    async fn test_write_creates_dir_and_records() {
        let dir = TempDir::new().unwrap();
        let export_dir = dir.path().join("exports");
        let (events, _rx) = broadcast::channel(8);
        let aggregator = ExportAggregator::spawn(events);
        let coordinator = ExportCoordinator::new(export_dir.clone(), aggregator);

        let path = coordinator
            .write(SaveKind::Json, "data.json", b"{\"a\":1}")
            .unwrap();

        assert!(path.starts_with(&export_dir));
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("data-"));
        assert!(file_name.ends_with(".json"));
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }
}
