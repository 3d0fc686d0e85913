//! Override-URL validation.

use url::Url;

/// Schemes an override URL may use.
const ALLOWED_SCHEMES: [&str; 4] = ["http", "https", "file", "data"];

/// Check a user-supplied override URL against the scheme allow-list.
///
/// Blank input is valid (it means "use the precedence fallbacks").
/// `javascript:` is rejected outright; `data:` and `file:` are accepted
/// without strict parsing since both commonly fail `Url::parse` host rules.
pub fn is_valid_override_url(input: &str) -> bool {
    let url = input.trim();
    if url.is_empty() {
        return true;
    }
    if url
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("javascript:"))
    {
        return false;
    }
    if url.starts_with("data:") || url.starts_with("file:") {
        return true;
    }
    match Url::parse(url) {
        Ok(parsed) => ALLOWED_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}
