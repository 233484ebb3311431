//! Input normalisation for untrusted form values.
//!
//! Every function here is total: rejection is reported as `None`, never as a
//! panic or an error. Values arrive as loosely-typed JSON so the same helpers
//! serve both form posts and JSON bodies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

/// Characters removed from free text before it is persisted or reflected.
const STRIPPED_CHARS: [char; 5] = ['<', '>', '"', '\'', '&'];

/// Length of a store identifier in hexadecimal form.
const IDENTIFIER_LEN: usize = 24;

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").ok()
        })
        .as_ref()
}

/// Accepts text no longer than `max_length` characters and strips markup/quote characters.
pub fn sanitize_string(value: &Value, max_length: usize) -> Option<String> {
    let text = value.as_str()?;
    if text.chars().count() > max_length {
        return None;
    }

    let cleaned: String = text.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    Some(cleaned.trim().to_string())
}

/// Parses a finite decimal from a JSON number or a numeric string.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    number.is_finite().then_some(number)
}

/// Parses a whole number; fractional input is rejected rather than truncated.
pub fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accepts only the store's canonical 24-character hexadecimal identifiers.
pub fn parse_identifier(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    if text.len() != IDENTIFIER_LEN {
        return None;
    }

    hex::decode(text).ok()?;
    Some(text.to_ascii_lowercase())
}

pub fn parse_email(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    email_regex()?.is_match(text).then(|| text.to_string())
}

/// Accepts absolute http(s) URLs with a host.
pub fn parse_url(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    let url = Url::parse(text).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_string_strips_markup() {
        assert_eq!(
            sanitize_string(&json!("<b>Tom & \"Jerry's\"</b>"), 100).as_deref(),
            Some("bTom  Jerrys/b")
        );
        assert_eq!(sanitize_string(&json!("  India  "), 100).as_deref(), Some("India"));
    }

    #[test]
    fn test_sanitize_string_rejects() {
        assert_eq!(sanitize_string(&json!(42), 100), None);
        assert_eq!(sanitize_string(&Value::Null, 100), None);
        assert_eq!(sanitize_string(&json!("abcdef"), 5), None);
        // Length counts characters, not bytes.
        assert_eq!(sanitize_string(&json!("🇮🇳"), 2).as_deref(), Some("🇮🇳"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(&json!(12.5)), Some(12.5));
        assert_eq!(parse_number(&json!(" 7 ")), Some(7.0));
        assert_eq!(parse_number(&json!("-3.25")), Some(-3.25));
        assert_eq!(parse_number(&json!("NaN")), None);
        assert_eq!(parse_number(&json!("inf")), None);
        assert_eq!(parse_number(&json!("12abc")), None);
        assert_eq!(parse_number(&json!(true)), None);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(&json!(5)), Some(5));
        assert_eq!(parse_integer(&json!("123456789")), Some(123_456_789));
        assert_eq!(parse_integer(&json!(1.5)), None);
        assert_eq!(parse_integer(&json!("1.5")), None);
    }

    #[test]
    fn test_parse_identifier() {
        assert_eq!(
            parse_identifier(&json!("64B7F0C2A1D3E4F5A6B7C8D9")).as_deref(),
            Some("64b7f0c2a1d3e4f5a6b7c8d9")
        );
        assert_eq!(parse_identifier(&json!("64b7f0c2a1d3e4f5a6b7c8d")), None);
        assert_eq!(parse_identifier(&json!("zzb7f0c2a1d3e4f5a6b7c8d9")), None);
        assert_eq!(parse_identifier(&json!(64)), None);
    }

    #[test]
    fn test_parse_email() {
        assert_eq!(
            parse_email(&json!("admin@example.com")).as_deref(),
            Some("admin@example.com")
        );
        assert_eq!(parse_email(&json!("admin@example")), None);
        assert_eq!(parse_email(&json!("not an email")), None);
        assert_eq!(parse_email(&json!(["a@b.co"])), None);
    }

    #[test]
    fn test_parse_url() {
        assert_eq!(
            parse_url(&json!("https://api.example.com/v1")).as_deref(),
            Some("https://api.example.com/v1")
        );
        assert_eq!(parse_url(&json!("ftp://example.com")), None);
        assert_eq!(parse_url(&json!("example.com")), None);
        assert_eq!(parse_url(&json!(null)), None);
    }
}
