//! Embeddable document generation.
//!
//! Produces the self-contained HTML document (and its `data:` URL) that the
//! host loads into the embedded view: theme colors and the base64-encoded
//! report are substituted into the selected template. Generation never
//! fails outright; a missing or unreadable report becomes an empty report
//! and a missing template degrades to a placeholder.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashMap;

use crate::config::BubbleConfig;
use crate::report::{self, ReportFile};
use crate::resolve::signature::{ContentSignature, SignatureHasher};
use crate::resolve::template::{self, LoadedTemplate};

/// Report bytes beyond this ceiling are silently dropped. This bounds the
/// embedded document (and data URL) size; it is lossy by design, not an
/// error.
pub const REPORT_BYTE_CEILING: usize = 512 * 1024;

/// A self-contained document loadable by the embedded view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddableDocument {
    pub html: String,
    pub url: String,
}

impl EmbeddableDocument {
    fn from_html(html: String) -> Self {
        let url = data_url(&html);
        Self { html, url }
    }
}

/// Encode HTML as a base64 `data:` URL.
pub fn data_url(html: &str) -> String {
    format!(
        "data:text/html;charset=utf-8;base64,{}",
        BASE64.encode(html.as_bytes())
    )
}

/// Decode a `data:text/html` URL back to its HTML payload.
pub fn decode_data_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let meta_lower = meta.to_ascii_lowercase();
    if !meta_lower.starts_with("text/html") {
        return None;
    }
    if meta_lower.contains(";base64") {
        let bytes = BASE64.decode(payload.as_bytes()).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        percent_encoding::percent_decode_str(payload)
            .decode_utf8()
            .ok()
            .map(|s| s.into_owned())
    }
}

/// Small inline document shown until the first generation lands.
pub fn placeholder_document() -> EmbeddableDocument {
    EmbeddableDocument::from_html(
        "<!doctype html><meta charset='utf-8'>\n<title>Bubble Units</title>\n\
         <body><p>Loading Bubble Units…</p></body>"
            .to_string(),
    )
}

/// Minimal inline document shown when URL resolution itself blew up. The
/// user-facing text stays generic; detail goes to the log only.
pub fn error_document() -> EmbeddableDocument {
    EmbeddableDocument::from_html(
        "<!doctype html><meta charset='utf-8'>\n<title>Bubble Units</title>\n\
         <body><p>Bubble Units could not render the report. See the host log.</p></body>"
            .to_string(),
    )
}

/// Everything that feeds one generation pass, gathered up front so the
/// signature can be computed (and compared) before the template work runs.
#[derive(Debug, Clone)]
pub struct DocumentInputs {
    pub project_name: String,
    pub project_root: String,
    pub report: Option<ReportFile>,
    pub report_bytes: Vec<u8>,
    pub template_name: String,
    pub template_dir: String,
}

/// Gather generation inputs: discover the report and read it (bounded).
pub fn collect_inputs(config: &BubbleConfig) -> DocumentInputs {
    let override_path = config.report_override();
    let report = report::find_best_report(config.get_root(), override_path.as_deref());
    let report_bytes = report
        .as_ref()
        .map(|r| read_report_limited(r))
        .unwrap_or_default();

    DocumentInputs {
        project_name: config.project_name(),
        project_root: config.get_root().to_string_lossy().into_owned(),
        report,
        report_bytes,
        template_name: config.template_name().to_string(),
        template_dir: config
            .template_dir()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Read at most [`REPORT_BYTE_CEILING`] bytes of the report.
///
/// Any read failure is treated as an empty report; generation proceeds.
fn read_report_limited(report: &ReportFile) -> Vec<u8> {
    let file = match std::fs::File::open(&report.path) {
        Ok(f) => f,
        Err(e) => {
            crate::log!("warning"; "failed reading report: {}", e);
            return Vec::new();
        }
    };
    let mut buf = Vec::with_capacity(REPORT_BYTE_CEILING.min(report.size as usize + 1));
    match file.take(REPORT_BYTE_CEILING as u64).read_to_end(&mut buf) {
        Ok(_) => buf,
        Err(e) => {
            crate::log!("warning"; "failed reading report: {}", e);
            Vec::new()
        }
    }
}

/// Signature over every input that can change the rendered document.
pub fn signature_of(config: &BubbleConfig, inputs: &DocumentInputs) -> ContentSignature {
    let mut hasher = SignatureHasher::new();
    hasher
        .field(&inputs.project_name)
        .field(&inputs.project_root)
        .field(
            &inputs
                .report
                .as_ref()
                .map(|r| r.path.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
        .bytes(&inputs.report_bytes);
    for color in config.theme.signature_fields() {
        hasher.field(color);
    }
    hasher.field(&inputs.template_name).field(&inputs.template_dir);
    hasher.finish()
}

/// Render the document for the given inputs.
pub fn render(config: &BubbleConfig, inputs: &DocumentInputs) -> EmbeddableDocument {
    let loaded = template::load_template(config, &inputs.template_name);
    let html = apply_template(config, inputs, &loaded);
    EmbeddableDocument::from_html(html)
}

/// Generate in one step: collect, sign, render.
pub fn generate(config: &BubbleConfig) -> (ContentSignature, EmbeddableDocument) {
    let inputs = collect_inputs(config);
    let signature = signature_of(config, &inputs);
    (signature, render(config, &inputs))
}

fn apply_template(
    config: &BubbleConfig,
    inputs: &DocumentInputs,
    loaded: &LoadedTemplate,
) -> String {
    let theme = &config.theme;
    let report_b64 = BASE64.encode(&inputs.report_bytes);
    let report_path = inputs
        .report
        .as_ref()
        .map(|r| r.path.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut values: FxHashMap<&str, String> = FxHashMap::default();
    values.insert("BGColour", theme.background.clone());
    values.insert("textColour", theme.text.clone());
    values.insert("errorColour", theme.error.clone());
    values.insert("failedColour", theme.failed.clone());
    values.insert("warningColour", theme.warning.clone());
    values.insert("successColour", theme.success.clone());
    values.insert("infoColour", theme.info.clone());
    values.insert("mutedColour", theme.muted.clone());
    values.insert("BUBBLE_UNITS_PROJECT_NAME", inputs.project_name.clone());
    values.insert("BUBBLE_UNITS_INTRO", String::new());
    values.insert("JUNIT_XML_BASE64", report_b64);
    values.insert("JUNIT_PATH", report_path);
    values.insert("PROJECT_BASE_PATH", inputs.project_root.clone());

    let text = if loaded.trusted() {
        std::borrow::Cow::Borrowed(loaded.text.as_str())
    } else {
        template::strip_inline_scripts(&loaded.text)
    };
    template::substitute(&text, &values)
}

// ============================================================================
// Tests
// ============================================================================
