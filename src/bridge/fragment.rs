//! URL-fragment fallback transport.
//!
//! When the primary bridge channel is unavailable (a fresh document loaded
//! before the script side connected), the view expresses save and notify
//! operations by navigating to a synthetic fragment:
//!
//! ```text
//! #__buSave=<urlencoded kind|name>&d=<base64>
//! #__buNotify=<urlencoded message>
//! ```
//!
//! The host recognizes the shapes on address-change events, performs the
//! equivalent action, and answers with a fragment-reset script so repeated
//! identical navigations are not swallowed by the view's own same-URL
//! no-navigate optimization.

use percent_encoding::percent_decode_str;

use super::SaveKind;

/// Script evaluated in the view to clear a consumed fragment.
pub const FRAGMENT_RESET_SCRIPT: &str =
    "try{history.replaceState(null,'',location.pathname+location.search);}catch(e){}";

/// A decoded fallback operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentAction {
    Save {
        kind: SaveKind,
        name: String,
        data: String,
    },
    Notify {
        message: String,
    },
}

/// Parse a navigated URL for a fallback fragment.
pub fn parse_fragment(url: &str) -> Option<FragmentAction> {
    let (_, hash) = url.split_once('#')?;

    if let Some(rest) = hash.strip_prefix("__buNotify=") {
        let encoded = rest.split('&').next().unwrap_or("");
        return Some(FragmentAction::Notify {
            message: decode(encoded),
        });
    }

    if let Some(rest) = hash.strip_prefix("__buSave=") {
        let name_part = rest.split('&').next().unwrap_or("");
        let data = rest
            .split_once("&d=")
            .map(|(_, d)| d.to_string())
            .unwrap_or_default();

        let kind_and_name = decode(name_part);
        let (kind, name) = match kind_and_name.split_once('|') {
            Some((kind, name)) if !kind.is_empty() => {
                (SaveKind::from_label(kind), name.to_string())
            }
            _ => (SaveKind::File, "snapshot".to_string()),
        };
        return Some(FragmentAction::Save { kind, name, data });
    }

    None
}

fn decode(encoded: &str) -> String {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

// ============================================================================
// Tests
// ============================================================================
