//! Host coordinator.
//!
//! Explicitly constructs and owns the host services and wires them with
//! channels:
//!
//! ```text
//! ReportWatcher --ReportChanged--> UrlResolver --DocumentChanged--> loader
//! BridgeChannel --ExportMsg--> export actor --record--> aggregator --Notify--> user
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use crate::actor::messages::{ExportMsg, HostEvent, ReportChanged};
use crate::bridge::BridgeChannel;
use crate::config::BubbleConfig;
use crate::export::{ExportCoordinator, notify::ExportAggregator};
use crate::resolve::UrlResolver;
use crate::watch::ReportWatcher;

/// How often abandoned transfers are swept.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Handles to the running host services.
pub struct HostHandles {
    pub resolver: Arc<UrlResolver>,
    pub bridge: Arc<BridgeChannel>,
    pub events: broadcast::Sender<HostEvent>,
}

pub struct Coordinator;

impl Coordinator {
    /// Spawn the host actor system. Must be called inside a tokio runtime.
    pub fn spawn(config: Arc<BubbleConfig>) -> Result<HostHandles> {
        let (events, _) = broadcast::channel(64);
        let export_dir = config.export_dir();

        // Export pipeline: bridge -> export actor -> aggregator -> user
        let aggregator = ExportAggregator::spawn(events.clone());
        let exporter = ExportCoordinator::new(export_dir.clone(), aggregator);
        let (export_tx, export_rx) = mpsc::unbounded_channel();
        tokio::spawn(export_loop(export_rx, exporter));

        let bridge = Arc::new(BridgeChannel::new(export_tx, events.clone(), export_dir));
        let resolver = Arc::new(UrlResolver::new(Arc::clone(&config), events.clone()));

        // Watcher -> resolver invalidation
        let (watch_tx, watch_rx) = mpsc::channel(64);
        let watcher = ReportWatcher::spawn(
            config.get_root().to_path_buf(),
            config.report_override(),
            watch_tx,
        )?;
        tokio::spawn(watch_loop(watch_rx, Arc::clone(&resolver), watcher));

        tokio::spawn(housekeeping_loop(Arc::clone(&bridge)));

        Ok(HostHandles {
            resolver,
            bridge,
            events,
        })
    }
}

/// Export actor: performs the blocking writes off the callback path.
async fn export_loop(mut rx: mpsc::UnboundedReceiver<ExportMsg>, exporter: ExportCoordinator) {
    while let Some(msg) = rx.recv().await {
        match msg {
            ExportMsg::Write { kind, name, bytes } => {
                let exporter = exporter.clone();
                let result =
                    tokio::task::spawn_blocking(move || exporter.write(kind, &name, &bytes)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => crate::log!("export"; "save failed: {}", e),
                    Err(e) => crate::log!("export"; "save task failed: {}", e),
                }
            }
        }
    }
}

/// Report changes invalidate the cache and nudge a debounced recompute.
///
/// The watcher is owned here: when this task ends it drops, unregisters,
/// and produces no further events.
async fn watch_loop(
    mut rx: mpsc::Receiver<ReportChanged>,
    resolver: Arc<UrlResolver>,
    _watcher: ReportWatcher,
) {
    while rx.recv().await.is_some() {
        crate::debug!("watch"; "report changed; invalidating document cache");
        resolver.invalidate();
        resolver.request_refresh();
    }
}

/// Periodic sweep of opened-but-never-committed transfers.
async fn housekeeping_loop(bridge: Arc<BridgeChannel>) {
    let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    loop {
        interval.tick().await;
        let evicted = bridge.transfers().evict_idle();
        if evicted > 0 {
            crate::debug!("bridge"; "evicted {} abandoned transfer(s)", evicted);
        }
    }
}
