//! Theme colors injected into the generated document.

use serde::{Deserialize, Serialize};

/// Theme colors (`[theme]`), as CSS hex strings.
///
/// Defaults match the built-in template fallbacks so a bare config renders
/// a readable light theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub background: String,
    pub text: String,
    pub error: String,
    pub failed: String,
    pub warning: String,
    pub success: String,
    pub info: String,
    pub muted: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            background: "#ffffff".into(),
            text: "#000000".into(),
            error: "#ff5252".into(),
            failed: "#ef5350".into(),
            warning: "#ffc107".into(),
            success: "#2e7d32".into(),
            info: "#2196f3".into(),
            muted: "#9e9e9e".into(),
        }
    }
}

impl ThemeConfig {
    /// The colors in signature order. Any single change here must change the
    /// content signature, so the order is fixed.
    pub fn signature_fields(&self) -> [&str; 8] {
        [
            &self.background,
            &self.text,
            &self.error,
            &self.failed,
            &self.warning,
            &self.success,
            &self.info,
            &self.muted,
        ]
    }
}
