//! Host server: serves the resolved document to the embedded view and runs
//! the bridge endpoint next to it.
//!
//! The request loop thread is the interactive thread; it never blocks on
//! document generation. `resolve()` hands back whatever is cached (or a
//! placeholder) and the background refresh pushes a reload to connected
//! views when the real document lands.

mod ws;

pub use ws::ViewClients;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tiny_http::{Header, Request, Response, Server};
use tokio::sync::broadcast;

use crate::actor::messages::{HostEvent, ViewMsg};
use crate::actor::{Coordinator, HostHandles};
use crate::bridge::bridge_script;
use crate::config::BubbleConfig;
use crate::resolve::document::decode_data_url;
use crate::{core, log, logger};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Run the host until shutdown.
pub fn run(config: Arc<BubbleConfig>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let handles = {
        let _guard = runtime.enter();
        Coordinator::spawn(Arc::clone(&config))?
    };

    let (server, addr) = bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let (ws_port, clients) =
        ws::start_ws_server(addr.port().saturating_add(1), Arc::clone(&handles.bridge))?;

    // Host events -> status line + connected views
    runtime.spawn(push_loop(handles.events.subscribe(), clients));

    let (shutdown_tx, _shutdown_rx) = crossbeam::channel::unbounded::<()>();
    core::register_server(Arc::clone(&server), shutdown_tx);

    // This thread owns the request loop from here on
    core::mark_interactive();

    // Warm the document cache
    handles.resolver.request_refresh();

    log!("serve"; "http://{}", addr);
    crate::debug!("serve"; "bridge ws://127.0.0.1:{}", ws_port);

    let mut last_loaded = config.settings.last_loaded_url.clone().unwrap_or_default();
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(_) => break, // Unblocked by shutdown handler
        };
        if core::is_shutdown() {
            break;
        }
        if let Err(e) = respond(request, &config, &handles, ws_port, &mut last_loaded) {
            crate::debug!("serve"; "response failed: {}", e);
        }
    }

    log!("serve"; "stopped");
    Ok(())
}

/// Forward host events to the status line and connected views.
async fn push_loop(mut rx: broadcast::Receiver<HostEvent>, clients: ViewClients) {
    loop {
        match rx.recv().await {
            Ok(HostEvent::DocumentChanged) => {
                logger::status_success("report updated");
                clients.broadcast(&ViewMsg::Reload {
                    reason: "report changed".to_string(),
                });
            }
            Ok(HostEvent::Notify(message)) => {
                logger::status_success(&message.replace('\n', "; "));
                clients.broadcast(&ViewMsg::Notify { message });
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                crate::debug!("serve"; "dropped {} host events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Serve one request.
fn respond(
    request: Request,
    config: &BubbleConfig,
    handles: &HostHandles,
    ws_port: u16,
    last_loaded: &mut String,
) -> Result<()> {
    let url_path = request.url().to_string();
    match url_path.as_str() {
        "/" | "/index.html" => {
            let url = handles.resolver.resolve();
            if url != *last_loaded {
                config.persist_last_loaded(&url);
                *last_loaded = url.clone();
            }
            let html = page_for_url(&url);
            respond_html(request, inject_bridge_tag(html))
        }
        "/__bridge.js" => respond_with(
            request,
            bridge_script(ws_port),
            "text/javascript; charset=utf-8",
        ),
        _ => {
            let response = Response::from_string("not found").with_status_code(404);
            request.respond(response)?;
            Ok(())
        }
    }
}

/// Materialize the effective URL as a servable page.
///
/// Generated documents decode straight from their data URL; anything else
/// (override or `.env` URL) gets a small redirect page, the same stub the
/// external-browser export writes.
fn page_for_url(url: &str) -> String {
    if let Some(html) = decode_data_url(url) {
        return html;
    }
    redirect_page(url)
}

/// A tiny page that forwards the view to an externally served report.
pub fn redirect_page(url: &str) -> String {
    let safe = url.replace('"', "%22");
    format!(
        "<!doctype html><meta charset=\"utf-8\"><title>Bubble Units</title>\n\
         <meta http-equiv=\"refresh\" content=\"0;url='{safe}'\">\n\
         <p>Opening bubble report… <a href=\"{safe}\">Continue</a></p>"
    )
}

/// Install the bridge script reference. Runs on every load; the script
/// itself is idempotent, so re-injection never double-binds.
fn inject_bridge_tag(html: String) -> String {
    const TAG: &str = "<script src=\"/__bridge.js\"></script>";
    if html.contains(TAG) {
        return html;
    }
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = html;
            out.insert_str(pos, TAG);
            out
        }
        None => html + TAG,
    }
}

fn respond_html(request: Request, body: String) -> Result<()> {
    respond_with(request, body, "text/html; charset=utf-8")
}

fn respond_with(request: Request, body: String, content_type: &str) -> Result<()> {
    let response = Response::from_string(body).with_header(
        Header::from_bytes("Content-Type", content_type)
            .unwrap_or_else(|()| Header::from_bytes("Content-Type", "text/plain").unwrap()),
    );
    request.respond(response)?;
    Ok(())
}

/// Bind to the specified interface and port, with automatic port retry.
fn bind_with_retry(interface: std::net::IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < MAX_PORT_RETRIES => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    MAX_PORT_RETRIES,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

// ============================================================================
// Tests
// ============================================================================
