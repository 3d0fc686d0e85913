//! One-shot render: resolve, generate, and optionally materialize the
//! effective target for an external browser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::broadcast;

use crate::config::BubbleConfig;
use crate::resolve::{UrlResolver, document};
use crate::{log, serve};

/// Export file name used for external-browser viewing.
const EXPORT_HTML_NAME: &str = "phpunit-bubble-report.html";

/// How long a one-shot render may take before giving up.
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(config: Arc<BubbleConfig>, output: Option<PathBuf>, export: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (events, _keepalive) = broadcast::channel(8);
    let resolver = {
        let _guard = runtime.enter();
        UrlResolver::new(Arc::clone(&config), events)
    };

    // This thread is not the interactive one; blocking here is the point.
    let doc = resolver
        .recompute_now(RENDER_TIMEOUT)?
        .ok_or_else(|| anyhow!("document generation timed out"))?;
    let url = resolver.resolve();

    if let Some(path) = &output {
        std::fs::write(path, &doc.html)
            .with_context(|| format!("writing {}", path.display()))?;
        log!("render"; "wrote {}", path.display());
    }

    if export {
        let dir = config.export_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating export dir {}", dir.display()))?;
        let path = dir.join(EXPORT_HTML_NAME);
        materialize(&url, &path)?;
        log!("render"; "exported {}", path.display());
    }

    if output.is_none() && !export {
        println!("{url}");
    }
    Ok(())
}

/// Write the effective target as a local HTML file an external browser can
/// open: data URLs decode in place, file URLs are copied, anything else
/// becomes a redirect stub.
fn materialize(url: &str, path: &Path) -> Result<()> {
    if let Some(html) = document::decode_data_url(url) {
        std::fs::write(path, html)?;
        return Ok(());
    }

    if let Ok(parsed) = url::Url::parse(url)
        && parsed.scheme() == "file"
        && let Ok(source) = parsed.to_file_path()
    {
        let bytes = std::fs::read(&source)
            .with_context(|| format!("copying {}", source.display()))?;
        std::fs::write(path, bytes)?;
        return Ok(());
    }

    std::fs::write(path, serve::redirect_page(url))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
