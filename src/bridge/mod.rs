//! Host side of the host ⇄ embedded-view bridge.
//!
//! Three logical sub-channels multiplex over one message primitive,
//! distinguished by message shape: **save** (exports, with a chunked
//! sub-protocol for large payloads), **notify** (user-facing messages) and
//! **console-forward** (view console output into the host log). A degraded
//! URL-fragment transport covers loads where the primary channel is not yet
//! available.
//!
//! Save wire grammar (tab-separated; payloads base64):
//!
//! ```text
//! <kind>\t<name>\t<base64>              single-shot, small payloads
//! BEGIN\t<id>\t<kind>\t<name>           open a chunked transfer
//! CHUNK\t<id>\t<base64-fragment>        append (ordered, repeatable)
//! END\t<id>                             close and commit
//! ```
//!
//! Protocol errors are local to the failing call: they never affect other
//! transfers or the channel itself.

mod fragment;
mod inject;
pub mod transfer;

pub use fragment::{FRAGMENT_RESET_SCRIPT, FragmentAction, parse_fragment};
pub use inject::bridge_script;
pub use transfer::TransferStore;

use std::fmt;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::actor::messages::{ExportMsg, HostEvent};

/// Export payload kinds. Closed set: an unknown label from the wire maps to
/// `File` rather than growing the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveKind {
    Svg,
    Json,
    Png,
    File,
}

impl SaveKind {
    /// Parse a wire label, case-insensitively.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "svg" => Self::Svg,
            "json" => Self::Json,
            "png" => Self::Png,
            _ => Self::File,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Json => "json",
            Self::Png => "png",
            Self::File => "file",
        }
    }
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-call protocol errors, mapped to the response status codes the view
/// script understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("missing transfer id")]
    MissingId,
    #[error("no such transfer")]
    NoSuchTransfer,
    #[error("transfer too large")]
    TransferTooLarge,
    #[error("empty payload")]
    EmptyPayload,
    #[error("invalid base64 payload")]
    InvalidPayload,
}

impl BridgeError {
    pub const fn status(self) -> u16 {
        match self {
            Self::MissingId | Self::EmptyPayload | Self::InvalidPayload => 400,
            Self::NoSuchTransfer => 404,
            Self::TransferTooLarge => 413,
        }
    }
}

/// Host-side bridge endpoint.
pub struct BridgeChannel {
    transfers: TransferStore,
    export_tx: mpsc::UnboundedSender<ExportMsg>,
    events: broadcast::Sender<HostEvent>,
    export_dir: PathBuf,
}

impl BridgeChannel {
    pub fn new(
        export_tx: mpsc::UnboundedSender<ExportMsg>,
        events: broadcast::Sender<HostEvent>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            transfers: TransferStore::new(),
            export_tx,
            events,
            export_dir,
        }
    }

    /// Transfer table, exposed for the housekeeping sweep.
    pub fn transfers(&self) -> &TransferStore {
        &self.transfers
    }

    /// Handle one save-channel message.
    ///
    /// Committed payloads are decoded here (so the caller gets the error)
    /// and handed to the export actor; the write itself never blocks this
    /// callback.
    pub fn handle_save(&self, raw: &str) -> Result<(), BridgeError> {
        let parts: Vec<&str> = raw.split('\t').collect();
        let command = parts.first().map(|c| c.to_ascii_uppercase());

        match command.as_deref() {
            Some("BEGIN") => {
                let id = parts
                    .get(1)
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .ok_or(BridgeError::MissingId)?;
                let kind = SaveKind::from_label(parts.get(2).copied().unwrap_or_default());
                let name = non_blank_or(parts.get(3).copied(), "snapshot");
                self.transfers.begin(id, kind, name);
                Ok(())
            }
            Some("CHUNK") => {
                let id = parts.get(1).copied().ok_or(BridgeError::NoSuchTransfer)?;
                let data = parts.get(2).copied().unwrap_or_default();
                self.transfers.chunk(id, data)
            }
            Some("END") => {
                let id = parts.get(1).copied().ok_or(BridgeError::NoSuchTransfer)?;
                let transfer = self.transfers.end(id)?;
                self.commit(transfer.kind, &transfer.name, &transfer.data)
            }
            _ => {
                // Single-shot; the payload may itself contain tabs
                let kind = SaveKind::from_label(parts.first().copied().unwrap_or_default());
                let name = non_blank_or(parts.get(1).copied(), "snapshot");
                let data = parts.get(2..).unwrap_or_default().join("\t");
                self.commit(kind, name, &data)
            }
        }
    }

    /// Decode a committed payload and queue it for export.
    fn commit(&self, kind: SaveKind, name: &str, data: &str) -> Result<(), BridgeError> {
        if data.is_empty() {
            return Err(BridgeError::EmptyPayload);
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|_| BridgeError::InvalidPayload)?;
        let _ = self.export_tx.send(ExportMsg::Write {
            kind,
            name: name.to_string(),
            bytes,
        });
        Ok(())
    }

    /// Handle one notify-channel message: sanitize and surface to the user.
    pub fn handle_notify(&self, raw: &str) {
        let message = sanitize_notify(raw);
        let mut body = message;
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str("Export directory: ");
        body.push_str(&self.export_dir.to_string_lossy());
        let _ = self.events.send(HostEvent::Notify(body));
    }

    /// Handle one console-forward message (`<level>\t<message>`).
    ///
    /// Errors and warnings surface at full log severity; everything else,
    /// including unknown levels, is informational.
    pub fn handle_console(&self, raw: &str) {
        let trimmed = raw.trim();
        let (level, message) = match trimmed.split_once('\t') {
            Some((level, message)) if !level.is_empty() => (level, message),
            _ => ("log", trimmed),
        };
        match level.to_ascii_lowercase().as_str() {
            "error" => crate::log!("webconsole"; "[error] {}", message),
            "warn" | "warning" => crate::log!("webconsole"; "[warn] {}", message),
            other => crate::debug!("webconsole"; "[{}] {}", other, message),
        }
    }

    /// Handle an address change reported by the embedded view.
    ///
    /// Recognized fallback fragments are executed and answered with the
    /// fragment-reset script; anything else is ignored.
    pub fn handle_address_change(&self, url: &str) -> Option<&'static str> {
        match parse_fragment(url)? {
            FragmentAction::Save { kind, name, data } => {
                if let Err(e) = self.commit(kind, &name, &data) {
                    crate::log!("bridge"; "fallback save failed: {}", e);
                }
            }
            FragmentAction::Notify { message } => self.handle_notify(&message),
        }
        Some(FRAGMENT_RESET_SCRIPT)
    }
}

fn non_blank_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback,
    }
}

/// Sanitize a notify payload: collapse whitespace, replace code-looking
/// content with a generic line, cap the length. Keeps function sources and
/// huge blobs out of user-facing notifications.
pub fn sanitize_notify(raw: &str) -> String {
    const MAX: usize = 500;

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let looks_like_code = collapsed.starts_with("function")
        || collapsed.starts_with("class ")
        || (collapsed.starts_with('(') && collapsed.contains("=>"))
        || (collapsed.contains("=>") && collapsed.contains('{'));

    let text = if looks_like_code {
        "Notification from Bubble Units".to_string()
    } else {
        collapsed
    };

    if text.chars().count() > MAX {
        let mut capped: String = text.chars().take(MAX).collect();
        capped.push('…');
        capped
    } else {
        text
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transfer::MAX_CHUNK_CHARS;

    fn channel() -> (BridgeChannel, mpsc::UnboundedReceiver<ExportMsg>) {
        let (export_tx, export_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(16);
        (
            BridgeChannel::new(export_tx, events, PathBuf::from("/tmp/exports")),
            export_rx,
        )
    }

    fn queued_bytes(rx: &mut mpsc::UnboundedReceiver<ExportMsg>) -> (SaveKind, String, Vec<u8>) {
        match rx.try_recv().expect("an export should be queued") {
            ExportMsg::Write { kind, name, bytes } => (kind, name, bytes),
        }
    }

    #[test]
    fn test_single_shot_save() {
        let (bridge, mut rx) = channel();
        let payload = BASE64.encode(b"<svg/>");
        bridge
            .handle_save(&format!("svg\tchart.svg\t{payload}"))
            .unwrap();

        let (kind, name, bytes) = queued_bytes(&mut rx);
        assert_eq!(kind, SaveKind::Svg);
        assert_eq!(name, "chart.svg");
        assert_eq!(bytes, b"<svg/>");
    }

    #[test]
    fn test_chunked_transfer_matches_single_shot() {
        let (bridge, mut rx) = channel();
        let content: Vec<u8> = (0u32..40_000).map(|i| (i % 251) as u8).collect();
        let b64 = BASE64.encode(&content);

        // Single-shot reference
        bridge
            .handle_save(&format!("png\tchart.png\t{b64}"))
            .unwrap();
        let (_, _, reference) = queued_bytes(&mut rx);

        // Chunked with arbitrary fragment sizes
        bridge.handle_save("BEGIN\tid1\tpng\tchart.png").unwrap();
        let mut rest = b64.as_str();
        for size in [7usize, 1, MAX_CHUNK_CHARS, 1000].iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let take = (*size).min(rest.len());
            let (head, tail) = rest.split_at(take);
            bridge.handle_save(&format!("CHUNK\tid1\t{head}")).unwrap();
            rest = tail;
        }
        bridge.handle_save("END\tid1").unwrap();

        let (kind, name, bytes) = queued_bytes(&mut rx);
        assert_eq!(kind, SaveKind::Png);
        assert_eq!(name, "chart.png");
        assert_eq!(bytes, reference);
        assert_eq!(bytes, content);
    }

    #[test]
    fn test_id_reuse_after_end_is_independent() {
        let (bridge, mut rx) = channel();
        bridge.handle_save("BEGIN\tid\tjson\ta.json").unwrap();
        bridge
            .handle_save(&format!("CHUNK\tid\t{}", BASE64.encode(b"first")))
            .unwrap();
        bridge.handle_save("END\tid").unwrap();
        let (_, name_a, bytes_a) = queued_bytes(&mut rx);

        bridge.handle_save("BEGIN\tid\tsvg\tb.svg").unwrap();
        bridge
            .handle_save(&format!("CHUNK\tid\t{}", BASE64.encode(b"second")))
            .unwrap();
        bridge.handle_save("END\tid").unwrap();
        let (kind_b, name_b, bytes_b) = queued_bytes(&mut rx);

        assert_eq!((name_a.as_str(), bytes_a.as_slice()), ("a.json", &b"first"[..]));
        assert_eq!(kind_b, SaveKind::Svg);
        assert_eq!((name_b.as_str(), bytes_b.as_slice()), ("b.svg", &b"second"[..]));
    }

    #[test]
    fn test_chunk_unknown_id_is_local_error() {
        let (bridge, mut rx) = channel();
        assert_eq!(
            bridge.handle_save("CHUNK\tnope\tQUJD"),
            Err(BridgeError::NoSuchTransfer)
        );
        assert_eq!(
            bridge.handle_save("END\tnope"),
            Err(BridgeError::NoSuchTransfer)
        );
        // The channel itself is unaffected
        bridge
            .handle_save(&format!("file\tx.bin\t{}", BASE64.encode(b"ok")))
            .unwrap();
        assert_eq!(queued_bytes(&mut rx).2, b"ok");
    }

    #[test]
    fn test_transfer_over_cap_aborts_then_no_such_transfer() {
        let (bridge, _rx) = channel();
        bridge.handle_save("BEGIN\tbig\tpng\tbig.png").unwrap();

        let chunk = "A".repeat(transfer::MAX_TRANSFER_CHARS / 2 + 1);
        bridge.handle_save(&format!("CHUNK\tbig\t{chunk}")).unwrap();
        assert_eq!(
            bridge.handle_save(&format!("CHUNK\tbig\t{chunk}")),
            Err(BridgeError::TransferTooLarge)
        );
        assert_eq!(
            bridge.handle_save("CHUNK\tbig\tAAAA"),
            Err(BridgeError::NoSuchTransfer)
        );
        assert_eq!(
            bridge.handle_save("END\tbig"),
            Err(BridgeError::NoSuchTransfer)
        );
    }

    #[test]
    fn test_begin_without_id_rejected() {
        let (bridge, _rx) = channel();
        let err = bridge.handle_save("BEGIN\t\tsvg\tchart.svg");
        assert_eq!(err, Err(BridgeError::MissingId));
        assert_eq!(err.unwrap_err().status(), 400);
    }

    #[test]
    fn test_end_with_empty_accumulation_rejected() {
        let (bridge, _rx) = channel();
        bridge.handle_save("BEGIN\tempty\tsvg\tchart.svg").unwrap();
        assert_eq!(
            bridge.handle_save("END\tempty"),
            Err(BridgeError::EmptyPayload)
        );
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let (bridge, _rx) = channel();
        assert_eq!(
            bridge.handle_save("svg\tchart.svg\t%%%not-base64%%%"),
            Err(BridgeError::InvalidPayload)
        );
    }

    #[test]
    fn test_unknown_kind_maps_to_file() {
        let (bridge, mut rx) = channel();
        bridge
            .handle_save(&format!("tarball\tout.tar\t{}", BASE64.encode(b"x")))
            .unwrap();
        assert_eq!(queued_bytes(&mut rx).0, SaveKind::File);
    }

    #[test]
    fn test_address_change_fallback_save() {
        let (bridge, mut rx) = channel();
        let reset = bridge
            .handle_address_change(&format!(
                "http://127.0.0.1:4177/#__buSave=json%7Cdata.json&d={}",
                BASE64.encode(b"{}")
            ))
            .expect("fragment should be handled");
        assert_eq!(reset, FRAGMENT_RESET_SCRIPT);

        let (kind, name, bytes) = queued_bytes(&mut rx);
        assert_eq!(kind, SaveKind::Json);
        assert_eq!(name, "data.json");
        assert_eq!(bytes, b"{}");
    }

    #[test]
    fn test_address_change_ignores_plain_urls() {
        let (bridge, _rx) = channel();
        assert!(bridge.handle_address_change("http://127.0.0.1:4177/").is_none());
        assert!(bridge
            .handle_address_change("http://127.0.0.1:4177/#top")
            .is_none());
    }

    #[test]
    fn test_sanitize_notify_collapses_and_caps() {
        assert_eq!(sanitize_notify("  saved   two\nfiles  "), "saved two files");

        let long = "a ".repeat(600);
        let sanitized = sanitize_notify(&long);
        assert_eq!(sanitized.chars().count(), 501);
        assert!(sanitized.ends_with('…'));
    }

    #[test]
    fn test_sanitize_notify_masks_code() {
        assert_eq!(
            sanitize_notify("function(){ alert(1) }"),
            "Notification from Bubble Units"
        );
        assert_eq!(
            sanitize_notify("(x) => { return x; }"),
            "Notification from Bubble Units"
        );
    }
}
