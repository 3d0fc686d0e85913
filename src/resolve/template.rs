//! Template loading and `{{TOKEN}}` substitution.
//!
//! Substitution is conservative: tokens are `{{NAME}}` with insignificant
//! interior whitespace and `[A-Za-z0-9_]` names. Anything else (including
//! templating syntax belonging to other systems, like `{{ $var }}`) passes
//! through untouched. Tokens missing from the supplied mapping fall back to
//! a built-in default map before being left as literal text.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use crate::config::BubbleConfig;

/// Bundled production template.
const BUNDLED_BUBBLE: &str = include_str!("../../assets/bubble.html");

/// Bundled dev-preview template.
const BUNDLED_BUBBLE_TEST: &str = include_str!("../../assets/bubble-test.html");

/// `{{TOKEN}}` / `{{ TOKEN }}` matcher.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid token regex"));

/// Whole `<script>...</script>` blocks, open tag captured separately so the
/// replacement can keep externally-referenced scripts.
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(<script\b[^>]*>).*?</script>").expect("valid script regex"));

static SRC_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsrc\s*=").expect("valid src regex"));

/// Where a template was loaded from. Local sources are untrusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    SearchDir(PathBuf),
    ProjectRoot(PathBuf),
    Bundled,
    /// Load failed everywhere; a minimal built-in placeholder is used.
    Fallback,
}

/// A template ready for substitution.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub text: String,
    pub source: TemplateSource,
}

impl LoadedTemplate {
    /// Local, user-editable templates get inline scripts stripped.
    pub fn trusted(&self) -> bool {
        matches!(
            self.source,
            TemplateSource::Bundled | TemplateSource::Fallback
        )
    }
}

/// Load the named template: configured search directory, then project root,
/// then the bundled default. A total miss degrades to a minimal placeholder
/// so the view never breaks; that failure is logged, not surfaced.
pub fn load_template(config: &BubbleConfig, name: &str) -> LoadedTemplate {
    if let Some(dir) = config.template_dir() {
        let candidate = dir.join(name);
        if let Some(text) = read_if_file(&candidate) {
            return LoadedTemplate {
                text,
                source: TemplateSource::SearchDir(candidate),
            };
        }
    }

    let project_file = config.root_join(name);
    if let Some(text) = read_if_file(&project_file) {
        return LoadedTemplate {
            text,
            source: TemplateSource::ProjectRoot(project_file),
        };
    }

    if let Some(text) = bundled(name) {
        return LoadedTemplate {
            text: text.to_string(),
            source: TemplateSource::Bundled,
        };
    }

    crate::log!("warning"; "could not load template {}; using placeholder", name);
    LoadedTemplate {
        text: format!(
            "<!doctype html>\n<meta charset=\"utf-8\">\n<title>Bubble Units</title>\n\
             <body>\n  <p>Could not load {name}</p>\n</body>"
        ),
        source: TemplateSource::Fallback,
    }
}

fn read_if_file(path: &std::path::Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            crate::log!("warning"; "failed to read template {}: {}", path.display(), e);
            None
        }
    }
}

fn bundled(name: &str) -> Option<&'static str> {
    match name {
        "bubble.html" => Some(BUNDLED_BUBBLE),
        "bubble-test.html" => Some(BUNDLED_BUBBLE_TEST),
        _ => None,
    }
}

/// Remove inline `<script>` blocks from locally loaded templates.
///
/// Scripts with a `src=` attribute stay so the page can still function;
/// bundled templates are trusted and never pass through here.
pub fn strip_inline_scripts(html: &str) -> Cow<'_, str> {
    SCRIPT_RE.replace_all(html, |caps: &Captures| {
        let open_tag = &caps[1];
        if SRC_ATTR_RE.is_match(open_tag) {
            caps[0].to_string()
        } else {
            String::new()
        }
    })
}

/// Apply `{{TOKEN}}` replacements with built-in fallbacks.
///
/// Lookup order per token: supplied mapping, default fallback map, literal
/// text unchanged.
pub fn substitute(html: &str, values: &FxHashMap<&str, String>) -> String {
    TOKEN_RE
        .replace_all(html, |caps: &Captures| {
            let name = &caps[1];
            if let Some(value) = values.get(name) {
                return value.clone();
            }
            if let Some(value) = default_fallbacks().get(name) {
                return (*value).to_string();
            }
            caps[0].to_string()
        })
        .into_owned()
}

/// Default safe fallbacks for known placeholders.
pub fn default_fallbacks() -> &'static FxHashMap<&'static str, &'static str> {
    static FALLBACKS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
        FxHashMap::from_iter([
            // Theme colors
            ("BGColour", "#ffffff"),
            ("textColour", "#000000"),
            ("errorColour", "#ff5252"),
            ("failedColour", "#ef5350"),
            ("warningColour", "#ffc107"),
            ("successColour", "#2e7d32"),
            ("infoColour", "#2196f3"),
            ("mutedColour", "#9e9e9e"),
            // Identity
            ("BUBBLE_UNITS_PROJECT_NAME", "Unknown project"),
            ("BUBBLE_UNITS_INTRO", ""),
            ("JUNIT_XML_BASE64", ""),
            ("JUNIT_PATH", ""),
            ("PROJECT_BASE_PATH", ""),
        ])
    });
    &FALLBACKS
}

// ============================================================================
// Tests
// ============================================================================
