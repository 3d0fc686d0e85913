//! Export notification aggregation.
//!
//! A burst of exports (SVG + JSON + PNG in quick succession) must not
//! produce three interruptive notifications. Completions queue behind a
//! mutex; each one rearms a debounce timer, and when the quiet window
//! passes the queue drains atomically into a single composed message.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use super::ExportRecord;
use crate::actor::messages::HostEvent;

/// Quiet window before a notification fires.
pub const EXPORT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Itemized entries shown before collapsing into a remainder count.
const MAX_LISTED: usize = 3;

/// Debounced, merging notification queue for export completions.
pub struct ExportAggregator {
    pending: Mutex<Vec<ExportRecord>>,
    kick_tx: mpsc::UnboundedSender<()>,
}

impl ExportAggregator {
    /// Create the aggregator and spawn its debounce task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(events: broadcast::Sender<HostEvent>) -> Arc<Self> {
        let (kick_tx, kick_rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            kick_tx,
        });
        tokio::spawn(debounce_loop(Arc::clone(&aggregator), kick_rx, events));
        aggregator
    }

    /// Queue a completion and (re)arm the debounce timer.
    pub fn record(&self, record: ExportRecord) {
        self.pending.lock().push(record);
        let _ = self.kick_tx.send(());
    }

    /// Drain the queue atomically. Appends racing with the drain land in
    /// the fresh queue and are notified on the next window.
    fn drain(&self) -> Vec<ExportRecord> {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Compose the user-facing message for a drained batch.
pub fn compose_message(records: &[ExportRecord]) -> Option<String> {
    match records {
        [] => None,
        [only] => Some(format!("Saved {} → {}", only.kind, only.path.display())),
        many => {
            let mut message = format!("Saved {} files:", many.len());
            for record in many.iter().take(MAX_LISTED) {
                message.push_str(&format!("\n• {}: {}", record.kind, record.path.display()));
            }
            if many.len() > MAX_LISTED {
                message.push_str(&format!("\n• …and {} more", many.len() - MAX_LISTED));
            }
            Some(message)
        }
    }
}

/// Classic debounce: every kick restarts the quiet window; when it elapses
/// the queue drains into one notification.
async fn debounce_loop(
    aggregator: Arc<ExportAggregator>,
    mut rx: mpsc::UnboundedReceiver<()>,
    events: broadcast::Sender<HostEvent>,
) {
    while rx.recv().await.is_some() {
        loop {
            tokio::select! {
                more = rx.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
                () = tokio::time::sleep(EXPORT_DEBOUNCE) => break,
            }
        }

        let records = aggregator.drain();
        if let Some(message) = compose_message(&records) {
            let _ = events.send(HostEvent::Notify(message));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SaveKind;
    use std::path::PathBuf;
    use tokio::time::timeout;

    fn record(kind: SaveKind, path: &str) -> ExportRecord {
        ExportRecord {
            kind,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_compose_empty_is_none() {
        assert!(compose_message(&[]).is_none());
    }

    #[test]
    fn test_compose_single_is_one_liner() {
        let message = compose_message(&[record(SaveKind::Svg, "/tmp/a.svg")]).unwrap();
        assert_eq!(message, "Saved svg → /tmp/a.svg");
    }

    #[test]
    fn test_compose_many_lists_first_three() {
        let records = [
            record(SaveKind::Svg, "/tmp/a.svg"),
            record(SaveKind::Json, "/tmp/b.json"),
            record(SaveKind::Png, "/tmp/c.png"),
            record(SaveKind::File, "/tmp/d.bin"),
            record(SaveKind::File, "/tmp/e.bin"),
        ];
        let message = compose_message(&records).unwrap();
        assert!(message.starts_with("Saved 5 files:"));
        assert!(message.contains("• svg: /tmp/a.svg"));
        assert!(message.contains("• png: /tmp/c.png"));
        assert!(!message.contains("d.bin"));
        assert!(message.ends_with("…and 2 more"));
    }

    #[tokio::test]
    async fn test_burst_produces_one_notification() {
        let (events, mut rx) = broadcast::channel(16);
        let aggregator = ExportAggregator::spawn(events);

        aggregator.record(record(SaveKind::Svg, "/tmp/a.svg"));
        aggregator.record(record(SaveKind::Json, "/tmp/b.json"));
        aggregator.record(record(SaveKind::Png, "/tmp/c.png"));

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notification should fire")
            .unwrap();
        let HostEvent::Notify(message) = event else {
            panic!("expected Notify event");
        };
        assert!(message.starts_with("Saved 3 files:"));
        assert!(message.contains("a.svg") && message.contains("b.json") && message.contains("c.png"));

        // Nothing else queued: no second notification
        assert!(
            timeout(Duration::from_millis(600), rx.recv()).await.is_err(),
            "burst must collapse into a single notification"
        );
    }

    #[tokio::test]
    async fn test_spaced_exports_notify_separately() {
        let (events, mut rx) = broadcast::channel(16);
        let aggregator = ExportAggregator::spawn(events);

        aggregator.record(record(SaveKind::Svg, "/tmp/a.svg"));
        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();

        aggregator.record(record(SaveKind::Json, "/tmp/b.json"));
        let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();

        let (HostEvent::Notify(first), HostEvent::Notify(second)) = (first, second) else {
            panic!("expected Notify events");
        };
        assert_eq!(first, "Saved svg → /tmp/a.svg");
        assert_eq!(second, "Saved json → /tmp/b.json");
    }
}
