//! Actor Message Definitions
//!
//! Message types for inter-actor communication.
//!
//! ```text
//! ReportWatcher --ReportChanged--> UrlResolver --HostEvent--> loader/status
//! BridgeChannel --ExportMsg--> ExportActor --HostEvent--> notification
//! ```

use serde::Serialize;

use crate::bridge::SaveKind;

// =============================================================================
// Host events
// =============================================================================

/// Events broadcast to host-side consumers (document loader, status line).
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// The generated document changed; loaders should reload it.
    DocumentChanged,
    /// A user-facing notification message.
    Notify(String),
}

// =============================================================================
// Export actor messages
// =============================================================================

/// Messages to the export actor.
#[derive(Debug)]
pub enum ExportMsg {
    /// Persist a committed transfer.
    Write {
        kind: SaveKind,
        name: String,
        bytes: Vec<u8>,
    },
}

// =============================================================================
// Watcher messages
// =============================================================================

/// A matching report change was observed (exactly one per watcher batch).
#[derive(Debug, Clone, Copy)]
pub struct ReportChanged;

// =============================================================================
// View push messages
// =============================================================================

/// Messages pushed to embedded-view clients over the bridge socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewMsg {
    /// Full document reload.
    Reload { reason: String },
    /// Show a notification inside the view.
    Notify { message: String },
    /// Evaluate script in the view (bridge re-injection, fragment reset).
    Eval { js: String },
}

impl ViewMsg {
    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload","reason":""}"#.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_msg_serialization() {
        let msg = ViewMsg::Reload {
            reason: "report changed".into(),
        };
        let json = msg.to_json();
        assert!(json.contains(r#""type":"reload""#));
        assert!(json.contains(r#""reason":"report changed""#));
    }
}
