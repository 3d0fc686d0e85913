//! Minimal `.env` reader for project-local overrides.
//!
//! Supports comments starting with `#`, blank lines, whitespace around keys
//! and values, and single or double quoted values with `\"`, `\'` and `\\`
//! escapes. A malformed line is skipped, and a file that cannot be read at
//! all counts as "no override found" (logged at warning level only).

use rustc_hash::FxHashMap;
use std::path::Path;

/// Keys naming the report file, checked in order.
const REPORT_PATH_KEYS: [&str; 2] = ["BUBBLE_UNITS_JUNIT_PATH", "JUNIT_XML_PATH"];

/// Keys naming an externally served report URL, checked in order.
const URL_KEYS: [&str; 2] = ["BUBBLE_UNITS_URL", "APP_URL"];

/// Read and parse `<root>/.env`. Missing file is not an error.
pub fn read_env(root: &Path) -> FxHashMap<String, String> {
    let path = root.join(".env");
    if !path.is_file() {
        return FxHashMap::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => parse_env_lines(content.lines()),
        Err(e) => {
            crate::log!("warning"; "failed to read .env: {}", e);
            FxHashMap::default()
        }
    }
}

/// Parse `KEY=value` lines into a map.
pub fn parse_env_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for raw in lines {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq) = line.find('=') else {
            continue;
        };
        if eq == 0 {
            continue;
        }
        let key = line[..eq].trim().to_string();
        let value = line[eq + 1..].trim();
        map.insert(key, unquote(value));
    }
    map
}

/// Strip matching quotes and resolve the simple escapes inside them.
fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if !quoted {
        return value.to_string();
    }

    let inner = &value[1..value.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    // Unknown escapes pass through untouched
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// First non-blank value among the report-path keys.
pub fn report_path_override(map: &FxHashMap<String, String>) -> Option<String> {
    first_non_blank(map, &REPORT_PATH_KEYS)
}

/// First non-blank value among the URL keys (primary wins over alias).
pub fn url_override(map: &FxHashMap<String, String>) -> Option<String> {
    first_non_blank(map, &URL_KEYS)
}

fn first_non_blank(map: &FxHashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        map.get(*key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

// ============================================================================
// Tests
// ============================================================================
