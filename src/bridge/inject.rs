//! Bridge script provisioning.
//!
//! A fresh document has no knowledge of the channel, so the host (re-)
//! installs the script-side stubs after every load and on manual request.
//! Idempotence lives in the script itself: an install marker guards against
//! double-bound handlers and double-wrapped console methods.

/// Marker property the injected script sets on `window`.
pub const INSTALL_MARKER: &str = "__buBridgeInstalled";

const BRIDGE_SCRIPT_TEMPLATE: &str = include_str!("bridge.js");

/// The injectable bridge script, bound to the given WebSocket port.
pub fn bridge_script(ws_port: u16) -> String {
    BRIDGE_SCRIPT_TEMPLATE.replace("__BU_WS_PORT__", &ws_port.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::transfer::MAX_CHUNK_CHARS;

    #[test]
    fn test_script_substitutes_port() {
        let script = bridge_script(4178);
        assert!(script.contains("ws://127.0.0.1:4178"));
        assert!(!script.contains("__BU_WS_PORT__"));
    }

    #[test]
    fn test_script_is_marker_guarded() {
        let script = bridge_script(4178);
        // Marker check happens before anything binds
        let marker_pos = script.find(INSTALL_MARKER).unwrap();
        let bind_pos = script.find("addEventListener").unwrap();
        assert!(marker_pos < bind_pos);
    }

    #[test]
    fn test_script_chunk_bound_matches_host() {
        let script = bridge_script(4178);
        assert!(script.contains(&format!("var MAX = {MAX_CHUNK_CHARS}")));
    }
}
