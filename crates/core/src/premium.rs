//! Premium subscription expiry parsing.

use std::sync::LazyLock;

use regex::Regex;

static PREMIUM_UNTIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}[./]\d{2}[./]\d{4})").expect("valid regex"));

/// Pull the first `dd.mm.yyyy` or `dd/mm/yyyy` date out of the platform's
/// premium status text.
///
/// The status text is localized free-form prose; only the date is kept.
pub fn extract_premium_until(status_text: &str) -> Option<String> {
    let normalized = status_text.replace('\u{a0}', " ");
    PREMIUM_UNTIL_RE
        .captures(&normalized)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
