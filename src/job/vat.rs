use once_cell::sync::Lazy;
use regex::Regex;

/// A VAT/ΑΦΜ label, optional `:` or whitespace, then nine digits.
/// Greek labels match regardless of case.
static VAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(ΑΦΜ|VAT|Afm|Α\.Φ\.Μ[.:])[:\s]*([0-9]{9})").expect("VAT pattern is valid")
});

/// First tax identifier found in rendered invoice markup
pub fn extract_vat(markup: &str) -> Option<String> {
    VAT_PATTERN
        .captures(markup)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Scanned payloads that are not web addresses never reach the browser
pub fn is_renderable_url(raw: &str) -> bool {
    raw.starts_with("http")
}
