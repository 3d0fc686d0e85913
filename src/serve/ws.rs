//! WebSocket bridge endpoint.
//!
//! The embedded view's script side connects here; frames carry one bridge
//! message each, prefixed by the sub-channel name:
//!
//! ```text
//! save\t<save-channel message>
//! notify\t<message>
//! console\t<level>\t<message>
//! nav\t<current URL>           address-change report (fallback fragments)
//! ```
//!
//! Per-connection frames are handled in arrival order, which preserves the
//! CHUNK ordering the chunked sub-protocol relies on. Host→view pushes
//! (reload, notify, eval) travel the same sockets as JSON.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::actor::messages::ViewMsg;
use crate::bridge::BridgeChannel;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Connected embedded-view clients, shared between the acceptor/reader
/// threads and the host-event pusher.
#[derive(Clone, Default)]
pub struct ViewClients {
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
}

impl ViewClients {
    /// Push a message to every connected client, dropping the ones that
    /// fail to accept it.
    pub fn broadcast(&self, msg: &ViewMsg) {
        let json = msg.to_json();
        let mut clients = self.clients.lock();
        clients.retain_mut(|ws| ws.send(Message::Text(json.clone().into())).is_ok());
    }

    pub fn count(&self) -> usize {
        self.clients.lock().len()
    }
}

/// Start the bridge WebSocket server. Returns the bound port and the shared
/// client registry.
pub fn start_ws_server(
    base_port: u16,
    bridge: Arc<BridgeChannel>,
) -> Result<(u16, ViewClients)> {
    let (listener, actual_port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    let clients = ViewClients::default();

    // Acceptor thread
    let accept_clients = clients.clone();
    std::thread::spawn(move || {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("bridge"; "view connected: {}", addr);
                    // Blocking mode during handshake, non-blocking for polling reads
                    let _ = stream.set_nonblocking(false);
                    match tungstenite::accept(stream) {
                        Ok(ws) => {
                            let _ = ws.get_ref().set_nonblocking(true);
                            accept_clients.clients.lock().push(ws);
                        }
                        Err(e) => crate::log!("bridge"; "handshake failed: {}", e),
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    crate::log!("bridge"; "accept error: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }
    });

    // Reader thread: poll clients and dispatch frames to the bridge
    let read_clients = clients.clone();
    std::thread::spawn(move || reader_loop(read_clients, bridge));

    Ok((actual_port, clients))
}

/// Poll client sockets, dispatching each text frame and answering on the
/// same socket.
fn reader_loop(clients: ViewClients, bridge: Arc<BridgeChannel>) {
    loop {
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut guard = clients.clients.lock();
        let mut disconnected = Vec::new();

        for (i, ws) in guard.iter_mut().enumerate() {
            loop {
                match ws.read() {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = dispatch_frame(&bridge, &text) {
                            let _ = ws.send(Message::Text(reply.into()));
                        }
                    }
                    Ok(Message::Close(_)) => {
                        disconnected.push(i);
                        break;
                    }
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        break; // No data available
                    }
                    Err(_) => {
                        disconnected.push(i);
                        break;
                    }
                    _ => {}
                }
            }
        }

        for i in disconnected.into_iter().rev() {
            guard.remove(i);
        }
    }
}

/// Dispatch one frame to its sub-channel. Returns the reply to send back,
/// if any.
fn dispatch_frame(bridge: &BridgeChannel, frame: &str) -> Option<String> {
    let (channel, payload) = frame.split_once('\t').unwrap_or((frame, ""));
    match channel {
        "save" => Some(match bridge.handle_save(payload) {
            Ok(()) => "OK".to_string(),
            Err(e) => format!("ERR\t{}\t{}", e.status(), e),
        }),
        "notify" => {
            bridge.handle_notify(payload);
            Some("OK".to_string())
        }
        "console" => {
            bridge.handle_console(payload);
            None
        }
        "nav" => bridge
            .handle_address_change(payload)
            .map(|js| ViewMsg::Eval { js: js.to_string() }.to_json()),
        other => {
            crate::debug!("bridge"; "unknown channel: {}", other);
            None
        }
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(format!("127.0.0.1:{}", port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind bridge WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use std::path::PathBuf;
    use tokio::sync::{broadcast, mpsc};

    fn bridge() -> (Arc<BridgeChannel>, mpsc::UnboundedReceiver<crate::actor::messages::ExportMsg>)
    {
        let (export_tx, export_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(8);
        (
            Arc::new(BridgeChannel::new(
                export_tx,
                events,
                PathBuf::from("/tmp/exports"),
            )),
            export_rx,
        )
    }

    #[test]
    fn test_dispatch_save_ok() {
        let (bridge, mut rx) = bridge();
        let frame = format!("save\tsvg\tchart.svg\t{}", BASE64.encode(b"<svg/>"));
        assert_eq!(dispatch_frame(&bridge, &frame).as_deref(), Some("OK"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_dispatch_save_error_carries_status() {
        let (bridge, _rx) = bridge();
        let reply = dispatch_frame(&bridge, "save\tCHUNK\tghost\tQUJD").unwrap();
        assert!(reply.starts_with("ERR\t404\t"));
    }

    #[test]
    fn test_dispatch_nav_fragment_answers_reset_eval() {
        let (bridge, _rx) = bridge();
        let frame = format!(
            "nav\thttp://127.0.0.1:4177/#__buNotify={}",
            "Saved%20ok"
        );
        let reply = dispatch_frame(&bridge, &frame).unwrap();
        assert!(reply.contains(r#""type":"eval""#));
        assert!(reply.contains("history.replaceState"));
    }

    #[test]
    fn test_dispatch_unknown_channel_silent() {
        let (bridge, _rx) = bridge();
        assert!(dispatch_frame(&bridge, "bogus\tpayload").is_none());
    }
}
