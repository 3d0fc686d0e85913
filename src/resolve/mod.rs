//! Effective-URL resolution and the generated-document cache.
//!
//! `UrlResolver` owns the cost of generating the default embeddable
//! document. `resolve()` never blocks: it applies the precedence rules and,
//! when the generated document wins, returns the cached value (or a small
//! placeholder) while nudging a debounced background recompute. Recomputes
//! are coalesced per resolver and last-writer-wins: a stale in-flight
//! result is discarded on completion, never applied over a newer one.

pub mod document;
pub mod signature;
pub mod template;

pub use document::{EmbeddableDocument, placeholder_document};
pub use signature::ContentSignature;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::actor::messages::HostEvent;
use crate::config::{BubbleConfig, env};
use crate::core;

/// Quiet window for coalescing invalidation bursts.
pub const REFRESH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Errors from the blocking recompute entry point.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Programming error: blocking recompute invoked on the interactive
    /// thread.
    #[error("blocking document recompute is forbidden on the interactive thread")]
    ThreadPolicyViolation,
}

/// The cached generation result. Replaced atomically, never mutated, so
/// readers can never observe a partially-built value.
#[derive(Debug)]
pub struct CachedDocument {
    pub signature: ContentSignature,
    pub document: EmbeddableDocument,
}

struct ResolverInner {
    config: Arc<BubbleConfig>,
    cached: ArcSwapOption<CachedDocument>,
    /// Monotonic request epoch for last-writer-wins publication.
    epoch: AtomicU64,
    refresh_tx: mpsc::UnboundedSender<()>,
    events: broadcast::Sender<HostEvent>,
}

/// Resolves the URL the host should currently load.
pub struct UrlResolver {
    inner: Arc<ResolverInner>,
}

impl UrlResolver {
    /// Create the resolver and spawn its debounced refresh task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: Arc<BubbleConfig>, events: broadcast::Sender<HostEvent>) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ResolverInner {
            config,
            cached: ArcSwapOption::empty(),
            epoch: AtomicU64::new(0),
            refresh_tx,
            events,
        });
        tokio::spawn(refresh_loop(Arc::clone(&inner), refresh_rx));
        Self { inner }
    }

    /// Resolve the effective URL. Non-blocking.
    ///
    /// Precedence (highest wins): explicit override, dev-preview flag
    /// (forces the generated document), `.env`-derived URL, generated
    /// document.
    pub fn resolve(&self) -> String {
        let settings = &self.inner.config.settings;

        // 1) Explicit override always wins if non-blank (validated at set time)
        if let Some(url) = settings.override_url.as_deref() {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }

        // 2) Dev preview forces the generated document
        if settings.dev_mode {
            return self.generated();
        }

        // 3) Project .env URL
        if let Some(url) = env::url_override(&env::read_env(self.inner.config.get_root())) {
            return url;
        }

        // 4) Generated document
        self.generated()
    }

    /// Cached generated-document URL (or a placeholder), plus a refresh
    /// nudge. The refresh task skips regeneration when the signature is
    /// already fresh.
    fn generated(&self) -> String {
        self.request_refresh();
        match self.inner.cached.load_full() {
            Some(cached) => cached.document.url.clone(),
            None => document::placeholder_document().url,
        }
    }

    /// Drop the cached entry. Call whenever a signature input is known to
    /// have changed (theme, report, settings).
    pub fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.cached.store(None);
    }

    /// Ask for a debounced background recompute.
    pub fn request_refresh(&self) {
        let _ = self.inner.refresh_tx.send(());
    }

    /// Current cached entry, if any.
    pub fn cached(&self) -> Option<Arc<CachedDocument>> {
        self.inner.cached.load_full()
    }

    /// Blocking recompute for callers that must wait (tests, one-shot
    /// render). Runs generation off the calling thread and publishes the
    /// result; on timeout returns `None` (the computation still publishes
    /// when it eventually lands, unless superseded).
    pub fn recompute_now(
        &self,
        timeout: Duration,
    ) -> Result<Option<EmbeddableDocument>, ResolveError> {
        if core::is_interactive_thread() {
            crate::log!("error"; "recompute_now called on the interactive thread");
            return Err(ResolveError::ThreadPolicyViolation);
        }

        let ticket = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let (signature, doc) = document::generate(&inner.config);
            publish(&inner, ticket, signature, doc.clone());
            let _ = tx.send(doc);
        });

        Ok(rx.recv_timeout(timeout).ok())
    }
}

/// Publish a generation result unless a newer request superseded it.
fn publish(
    inner: &ResolverInner,
    ticket: u64,
    signature: ContentSignature,
    document: EmbeddableDocument,
) {
    if inner.epoch.load(Ordering::SeqCst) != ticket {
        crate::debug!("resolve"; "discarding stale generation {}", signature);
        return;
    }

    let changed = match inner.cached.load_full().as_deref() {
        Some(prev) => prev.signature != signature || prev.document != document,
        None => true,
    };
    inner.cached.store(Some(Arc::new(CachedDocument {
        signature,
        document,
    })));

    // Suppress redundant reloads when nothing actually changed
    if changed {
        crate::debug!("resolve"; "generated document updated ({})", signature);
        let _ = inner.events.send(HostEvent::DocumentChanged);
    }
}

/// Debounced, coalesced refresh task: one recompute in flight per resolver,
/// each burst of triggers collapsing into a single generation pass.
async fn refresh_loop(inner: Arc<ResolverInner>, mut rx: mpsc::UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
        // Restart the quiet window on every further trigger
        loop {
            tokio::select! {
                more = rx.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
                () = tokio::time::sleep(REFRESH_DEBOUNCE) => break,
            }
        }

        let ticket = inner.epoch.load(Ordering::SeqCst);
        let worker = Arc::clone(&inner);
        let result = tokio::task::spawn_blocking(move || {
            let inputs = document::collect_inputs(&worker.config);
            let signature = document::signature_of(&worker.config, &inputs);
            if let Some(prev) = worker.cached.load_full()
                && prev.signature == signature
            {
                // Cache already fresh for current inputs
                return None;
            }
            Some((signature, document::render(&worker.config, &inputs)))
        })
        .await;

        match result {
            Ok(Some((signature, doc))) => publish(&inner, ticket, signature, doc),
            Ok(None) => crate::debug!("resolve"; "cache fresh; skipping regeneration"),
            Err(e) => {
                // Unexpected failure: full detail to the log, one generic
                // notification to the user, an inline error document in
                // place of content.
                crate::log!("error"; "document generation task failed: {}", e);
                let _ = inner.events.send(HostEvent::Notify(
                    "Bubble Units could not render the report".to_string(),
                ));
                let mut hasher = signature::SignatureHasher::new();
                hasher.field("resolution-error");
                publish(&inner, ticket, hasher.finish(), document::error_document());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn config_at(root: &std::path::Path) -> BubbleConfig {
        BubbleConfig {
            root: root.to_path_buf(),
            config_path: root.join("bubbleview.toml"),
            ..BubbleConfig::default()
        }
    }

    fn resolver_with(config: BubbleConfig) -> (UrlResolver, broadcast::Receiver<HostEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (UrlResolver::new(Arc::new(config), tx), rx)
    }

    const GENERATED_PREFIX: &str = "data:text/html;charset=utf-8;base64,";

    #[tokio::test]
    async fn test_precedence_table() {
        // (override set, dev mode, env url present) for all 2x2x2 combos
        for case in 0..8u8 {
            let has_override = case & 4 != 0;
            let dev_mode = case & 2 != 0;
            let has_env = case & 1 != 0;

            let dir = TempDir::new().unwrap();
            if has_env {
                fs::write(dir.path().join(".env"), "BUBBLE_UNITS_URL=http://env.local\n")
                    .unwrap();
            }
            let mut config = config_at(dir.path());
            if has_override {
                config
                    .settings
                    .set_override_url("https://override.local")
                    .unwrap();
            }
            config.settings.dev_mode = dev_mode;

            let (resolver, _rx) = resolver_with(config);
            let url = resolver.resolve();

            let context = format!("override={has_override} dev={dev_mode} env={has_env}");
            if has_override {
                assert_eq!(url, "https://override.local", "{context}");
            } else if dev_mode {
                assert!(url.starts_with(GENERATED_PREFIX), "{context}");
            } else if has_env {
                assert_eq!(url, "http://env.local", "{context}");
            } else {
                assert!(url.starts_with(GENERATED_PREFIX), "{context}");
            }
        }
    }

    #[tokio::test]
    async fn test_generated_document_contains_report_bytes() {
        let dir = TempDir::new().unwrap();
        let report_xml = "<testsuite name='s'><testcase name='t' time='0.2'/></testsuite>";
        fs::write(dir.path().join("junit-report.xml"), report_xml).unwrap();

        let (resolver, _rx) = resolver_with(config_at(dir.path()));
        resolver
            .recompute_now(Duration::from_secs(10))
            .unwrap()
            .expect("recompute should complete");

        let url = resolver.resolve();
        let payload = url.strip_prefix(GENERATED_PREFIX).expect("generated URL");
        let html = String::from_utf8(BASE64.decode(payload).unwrap()).unwrap();
        assert!(html.contains(&BASE64.encode(report_xml.as_bytes())));
    }

    #[tokio::test]
    async fn test_identical_recompute_publishes_no_event() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("junit-report.xml"), "<testsuite/>").unwrap();

        let (resolver, mut rx) = resolver_with(config_at(dir.path()));
        resolver.recompute_now(Duration::from_secs(10)).unwrap();
        assert!(matches!(rx.try_recv(), Ok(HostEvent::DocumentChanged)));

        let first = resolver.cached().expect("cached after recompute");
        resolver.recompute_now(Duration::from_secs(10)).unwrap();
        let second = resolver.cached().expect("still cached");

        assert_eq!(first.signature, second.signature);
        assert!(rx.try_recv().is_err(), "no event for identical content");
    }

    #[tokio::test]
    async fn test_invalidate_forces_cache_miss() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("junit-report.xml"), "<testsuite/>").unwrap();

        let (resolver, _rx) = resolver_with(config_at(dir.path()));
        resolver.recompute_now(Duration::from_secs(10)).unwrap();
        assert!(resolver.cached().is_some());

        resolver.invalidate();
        assert!(resolver.cached().is_none());
        assert!(resolver.resolve().starts_with(GENERATED_PREFIX));
    }

    #[tokio::test]
    async fn test_stale_result_never_overwrites_newer_request() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("junit-report.xml"), "<testsuite/>").unwrap();

        let (resolver, _rx) = resolver_with(config_at(dir.path()));
        let stale_ticket = resolver.inner.epoch.load(Ordering::SeqCst);

        // A newer request arrives while the stale computation is in flight
        resolver.invalidate();

        let (signature, doc) = document::generate(&resolver.inner.config);
        publish(&resolver.inner, stale_ticket, signature, doc);
        assert!(
            resolver.cached().is_none(),
            "stale result must be discarded"
        );
    }

    #[tokio::test]
    async fn test_recompute_now_rejects_interactive_thread() {
        let dir = TempDir::new().unwrap();
        let (resolver, _rx) = resolver_with(config_at(dir.path()));

        core::mark_interactive();
        let result = resolver.recompute_now(Duration::from_secs(1));
        core::clear_interactive_for_test();

        assert!(matches!(result, Err(ResolveError::ThreadPolicyViolation)));
    }

    #[tokio::test]
    async fn test_recompute_now_timeout_returns_none() {
        let dir = TempDir::new().unwrap();
        let (resolver, _rx) = resolver_with(config_at(dir.path()));

        // Zero timeout expires before the worker thread can possibly finish
        let result = resolver.recompute_now(Duration::ZERO).unwrap();
        assert!(result.is_none());
    }
}
