//! Report file watcher.
//!
//! Watches the project root and raises exactly one `ReportChanged` per
//! change batch that touches a report file. A test run can rewrite the
//! report many times per second; batches arrive pre-coalesced from the
//! notification layer and the resolver applies its own debounce downstream,
//! so no additional debounce happens here.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::actor::messages::ReportChanged;
use crate::report;

/// Watches for report file changes. Dropping the watcher unregisters it;
/// no further events are produced afterward.
pub struct ReportWatcher {
    /// Watcher handle (must be kept alive)
    _watcher: RecommendedWatcher,
}

impl ReportWatcher {
    /// Start watching `root`, forwarding one `ReportChanged` per matching
    /// batch to `tx`.
    ///
    /// `override_path` is the explicitly configured report path; an exact
    /// match on it always qualifies regardless of naming convention.
    pub fn spawn(
        root: PathBuf,
        override_path: Option<PathBuf>,
        tx: mpsc::Sender<ReportChanged>,
    ) -> notify::Result<Self> {
        // Create sync channel for notify (it doesn't support async)
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        if root.exists() {
            watcher.watch(&root, RecursiveMode::Recursive)?;
        }

        // Forward matching batches to the async side. The thread ends when
        // the watcher (and with it the notify sender) is dropped.
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if batch_matches(&event, override_path.as_deref()) {
                            crate::debug!("watch"; "report change: {:?}", event.kind);
                            if tx.blocking_send(ReportChanged).is_err() {
                                break; // Receiver dropped
                            }
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

/// Does this change batch touch a report file?
///
/// Metadata-only modifications are ignored (mtime/chmod noise would
/// otherwise trigger endless reload loops).
pub(crate) fn batch_matches(event: &notify::Event, override_path: Option<&Path>) -> bool {
    use notify::EventKind;

    match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => {}
        EventKind::Modify(modify) => {
            if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                return false;
            }
        }
        _ => return false,
    }

    event
        .paths
        .iter()
        .any(|path| report::matches_report_path(path, override_path))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn modify_kind() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        ))
    }

    fn create_kind() -> notify::EventKind {
        notify::EventKind::Create(notify::event::CreateKind::File)
    }

    fn remove_kind() -> notify::EventKind {
        notify::EventKind::Remove(notify::event::RemoveKind::File)
    }

    fn metadata_kind() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
            notify::event::MetadataKind::Any,
        ))
    }

    #[test]
    fn test_report_names_match() {
        for name in [
            "/p/junit-report.xml",
            "/p/TEST-Foo.xml",
            "/p/TESTS-TestSuites.xml",
        ] {
            assert!(
                batch_matches(&make_event(vec![name], create_kind()), None),
                "{name} should match"
            );
        }
    }

    #[test]
    fn test_non_matching_files_never_trigger() {
        assert!(!batch_matches(
            &make_event(vec!["/p/notes.txt"], create_kind()),
            None
        ));
        // Same stem, different extension
        assert!(!batch_matches(
            &make_event(vec!["/p/junit-report.txt"], modify_kind()),
            None
        ));
    }

    #[test]
    fn test_batch_with_one_match_triggers() {
        let event = make_event(
            vec!["/p/notes.txt", "/p/junit-report.xml", "/p/other.log"],
            modify_kind(),
        );
        assert!(batch_matches(&event, None));
    }

    #[test]
    fn test_all_change_kinds_trigger() {
        for kind in [create_kind(), modify_kind(), remove_kind()] {
            assert!(batch_matches(
                &make_event(vec!["/p/junit-report.xml"], kind),
                None
            ));
        }
    }

    #[test]
    fn test_metadata_only_modify_ignored() {
        assert!(!batch_matches(
            &make_event(vec!["/p/junit-report.xml"], metadata_kind()),
            None
        ));
    }

    #[test]
    fn test_override_path_matches_any_name() {
        let override_path = Path::new("/custom/results.data");
        let event = make_event(vec!["/custom/results.data"], modify_kind());
        assert!(batch_matches(&event, Some(override_path)));
        assert!(!batch_matches(&event, None));
    }
}
