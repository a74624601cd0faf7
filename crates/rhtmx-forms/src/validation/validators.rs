// File: src/validation/validators.rs
// Purpose: Value checks shared by the field validator

use once_cell::sync::Lazy;
use regex::Regex;

// Email validation regex
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

// URL validation regex
static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap()
});

/// Validate email format
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Validate URL format
pub fn is_valid_url(url: &str) -> bool {
    URL_REGEX.is_match(url)
}

/// Parse a submitted number, accepting surrounding whitespace
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Check that the whole value matches a pattern
///
/// Invalid patterns never match.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!("Invalid field pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Length in characters, not bytes
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}
