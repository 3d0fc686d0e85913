//! Host configuration management for `bubbleview.toml`.
//!
//! Sections:
//!
//! | Section      | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `[settings]` | Override URL, dev mode, template + export locations  |
//! | `[theme]`    | Colors injected into the generated document          |
//! | `[serve]`    | Host server (interface, port)                        |

pub mod env;
mod theme;
mod url;

pub use self::url::is_valid_override_url;
pub use theme::ThemeConfig;

use crate::{cli::Cli, log};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Default export directory name under the project root.
pub const DEFAULT_EXPORT_DIR: &str = ".bubble-unit-snapshots";

/// Production template document name.
pub const DEFAULT_TEMPLATE: &str = "bubble.html";

/// Dev-preview template document name.
pub const DEV_TEMPLATE: &str = "bubble-test.html";

/// Settings-level errors surfaced synchronously to the caller.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Override URL failed the scheme allow-list; it is rejected before
    /// being stored.
    #[error("invalid override URL `{0}`: only http, https, file and data schemes are allowed")]
    InvalidOverrideUrl(String),
}

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing bubbleview.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BubbleConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Persisted user settings
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Theme colors for the generated document
    #[serde(default)]
    pub theme: ThemeConfig,

    /// Host server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Persisted user settings (`[settings]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Explicit URL override; wins over everything when non-blank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_url: Option<String>,

    /// Developer preview: force the generated document regardless of any
    /// environment-derived URL.
    pub dev_mode: bool,

    /// External directory searched for template documents before the
    /// project root and the bundled default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    /// Template document selected in dev mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,

    /// URL of the last document the host actually loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded_url: Option<String>,

    /// Directory for exported files; defaults to
    /// `<root>/.bubble-unit-snapshots`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
}

/// Host server settings (`[serve]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    pub interface: IpAddr,

    /// Port for the document server; the bridge WebSocket binds port + 1.
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::from([127, 0, 0, 1]),
            port: 4177,
        }
    }
}

impl BubbleConfig {
    /// Load configuration for the project root selected by the CLI.
    ///
    /// A missing config file yields defaults; an override URL that fails the
    /// scheme allow-list is rejected here, before anything is stored.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        let root = root.canonicalize().unwrap_or(root);
        let config_path = root.join(&cli.config);

        let mut config = if config_path.is_file() {
            let content = fs::read_to_string(&config_path)?;
            let (config, ignored) = Self::parse_with_ignored(&content)?;
            if !ignored.is_empty() {
                Self::warn_unknown_fields(&ignored, &config_path);
            }
            config
        } else {
            Self::default()
        };

        config.root = root;
        config.config_path = config_path;

        if let Some(url) = config.settings.override_url.take() {
            // Re-validate through the setter so a hand-edited config file
            // cannot smuggle in a rejected scheme.
            config.settings.set_override_url(&url)?;
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Warn about unknown fields.
    fn warn_unknown_fields(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}: {}", display_path, fields.join(", "));
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Project display name shown in the rendered document.
    pub fn project_name(&self) -> String {
        let dir = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{dir} BubbleUnits")
    }

    /// Template document name to render.
    ///
    /// Dev mode prefers the selected template, else the dev default; outside
    /// dev mode the production template is always used.
    pub fn template_name(&self) -> &str {
        if self.settings.dev_mode {
            self.settings
                .template_name
                .as_deref()
                .unwrap_or(DEV_TEMPLATE)
        } else {
            DEFAULT_TEMPLATE
        }
    }

    /// Template search directory override, `~`-expanded.
    pub fn template_dir(&self) -> Option<PathBuf> {
        self.settings.template_dir.as_ref().map(|dir| expand(dir))
    }

    /// Export directory, `~`-expanded, without touching the filesystem.
    pub fn export_dir(&self) -> PathBuf {
        match &self.settings.export_dir {
            Some(dir) if !dir.as_os_str().is_empty() => {
                let expanded = expand(dir);
                if expanded.is_absolute() {
                    expanded
                } else {
                    self.root.join(expanded)
                }
            }
            _ => self.root.join(DEFAULT_EXPORT_DIR),
        }
    }

    /// Report path override from `.env`, resolved against the project root.
    pub fn report_override(&self) -> Option<PathBuf> {
        env::report_path_override(&env::read_env(&self.root)).map(|raw| {
            let path = PathBuf::from(raw);
            let abs = if path.is_absolute() {
                path
            } else {
                self.root.join(path)
            };
            abs.canonicalize().unwrap_or(abs)
        })
    }

    /// Persist the last-loaded URL back to the config file. Best effort:
    /// failures are logged, never propagated to the loader.
    pub fn persist_last_loaded(&self, url: &str) {
        let mut copy = self.clone();
        copy.settings.last_loaded_url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
        match toml::to_string_pretty(&copy) {
            Ok(text) => {
                if let Err(e) = fs::write(&self.config_path, text) {
                    crate::debug!("config"; "failed to persist last loaded URL: {}", e);
                }
            }
            Err(e) => crate::debug!("config"; "failed to serialize config: {}", e),
        }
    }
}

impl SettingsConfig {
    /// Set (or clear) the override URL.
    ///
    /// Blank input clears the override so the dev flag / `.env` precedence
    /// can take effect. A URL failing the scheme allow-list is rejected and
    /// never stored.
    pub fn set_override_url(&mut self, raw: &str) -> Result<(), SettingsError> {
        let trimmed = raw.trim();
        if !is_valid_override_url(trimmed) {
            return Err(SettingsError::InvalidOverrideUrl(trimmed.to_string()));
        }
        self.override_url = Some(trimmed.to_string()).filter(|u| !u.is_empty());
        Ok(())
    }
}

/// Expand `~` in a configured path.
fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(root: &Path) -> BubbleConfig {
        BubbleConfig {
            root: root.to_path_buf(),
            config_path: root.join("bubbleview.toml"),
            ..BubbleConfig::default()
        }
    }

    #[test]
    fn test_parse_with_ignored_reports_unknown_fields() {
        let content = "[settings]\ndev_mode = true\nbogus = 1\n";
        let (config, ignored) = BubbleConfig::parse_with_ignored(content).unwrap();
        assert!(config.settings.dev_mode);
        assert_eq!(ignored, vec!["settings.bogus"]);
    }

    #[test]
    fn test_set_override_url_rejects_javascript() {
        let mut settings = SettingsConfig::default();
        let err = settings.set_override_url("javascript:alert(1)");
        assert!(matches!(err, Err(SettingsError::InvalidOverrideUrl(_))));
        assert!(settings.override_url.is_none());
    }

    #[test]
    fn test_set_override_url_blank_clears() {
        let mut settings = SettingsConfig::default();
        settings.set_override_url("https://example.com").unwrap();
        assert_eq!(
            settings.override_url.as_deref(),
            Some("https://example.com")
        );

        settings.set_override_url("   ").unwrap();
        assert!(settings.override_url.is_none());
    }

    #[test]
    fn test_template_name_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config_at(dir.path());

        assert_eq!(config.template_name(), DEFAULT_TEMPLATE);

        config.settings.dev_mode = true;
        assert_eq!(config.template_name(), DEV_TEMPLATE);

        config.settings.template_name = Some("custom.html".into());
        assert_eq!(config.template_name(), "custom.html");

        // Selection only honored in dev mode
        config.settings.dev_mode = false;
        assert_eq!(config.template_name(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_export_dir_defaults_under_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_at(dir.path());
        assert_eq!(config.export_dir(), dir.path().join(DEFAULT_EXPORT_DIR));
    }

    #[test]
    fn test_export_dir_relative_resolves_against_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config_at(dir.path());
        config.settings.export_dir = Some(PathBuf::from("out/snapshots"));
        assert_eq!(config.export_dir(), dir.path().join("out/snapshots"));
    }
}
