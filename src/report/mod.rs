//! JUnit report file discovery.
//!
//! The host never knows the report path in advance: a test runner may drop
//! `junit-report.xml` at the project root, a `TEST-*.xml` per suite under a
//! build directory, or anything the `.env` override points at. Matching and
//! best-match discovery live here so the watcher and the document generator
//! agree on what "the report" is.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jwalk::WalkDir;

/// Exact report file names (compared case-insensitively).
const REPORT_NAMES: [&str; 6] = [
    "junit.xml",
    "junit-report.xml",
    "report.junit.xml",
    "junit.report.xml",
    "tests-testsuites.xml",
    "test-results.xml",
];

/// Directory names skipped during best-match discovery.
const SKIPPED_DIRS: [&str; 3] = ["node_modules", "target", "vendor"];

/// The watcher's and generator's notion of "the" report file.
///
/// Re-resolved on every cycle since the best match may change between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub path: PathBuf,
    pub size: u64,
    pub display_name: String,
}

impl ReportFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        let meta = std::fs::metadata(&path).ok()?;
        if !meta.is_file() {
            return None;
        }
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Self {
            path,
            size: meta.len(),
            display_name,
        })
    }
}

/// Does this filename follow one of the JUnit report naming conventions?
///
/// Either a case-insensitive match against the fixed allow-list, or the
/// `TEST-*.xml` per-suite pattern (prefix exact, extension case-insensitive).
pub fn is_report_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if REPORT_NAMES.contains(&lower.as_str()) {
        return true;
    }
    name.starts_with("TEST-") && lower.ends_with(".xml")
}

/// Does this path qualify as the report?
///
/// A configured override path qualifies by exact match regardless of naming
/// convention; everything else goes through [`is_report_file_name`].
pub fn matches_report_path(path: &Path, override_path: Option<&Path>) -> bool {
    if let Some(expected) = override_path
        && path == expected
    {
        return true;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_report_file_name)
}

/// Find the best report file: the override when it exists, otherwise the
/// most-recently-modified file under `root` matching the naming conventions.
pub fn find_best_report(root: &Path, override_path: Option<&Path>) -> Option<ReportFile> {
    if let Some(path) = override_path
        && let Some(report) = ReportFile::from_path(path.to_path_buf())
    {
        return Some(report);
    }

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for path in WalkDir::new(root)
        .skip_hidden(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| !in_skipped_dir(p, root))
    {
        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_report_file_name);
        if !name_matches {
            continue;
        }
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match &best {
            Some((best_time, _)) if *best_time >= modified => {}
            _ => best = Some((modified, path)),
        }
    }

    best.and_then(|(_, path)| ReportFile::from_path(path))
}

/// Is any directory component under `root` in the skip list?
fn in_skipped_dir(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
    })
}

// ============================================================================
// Tests
// ============================================================================
