//! String and collection helpers shared by the value types.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// `true` when the string is empty or only whitespace.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Names that appear more than once, compared case-insensitively.
///
/// Each duplicate is reported once, in the spelling of its first repeat.
#[must_use]
pub fn case_insensitive_duplicates<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for name in names {
        let count = seen.entry(name.to_lowercase()).or_insert(0);
        *count = count.saturating_add(1);
        if *count == 2 {
            duplicates.push(name.to_owned());
        }
    }
    duplicates
}

/// Sort and remove duplicates in place.
pub fn dedupe_sorted(values: &mut Vec<String>) {
    values.sort();
    values.dedup();
}

/// Truncate to at most `max` characters (not bytes).
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Standard base64 with padding.
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode standard base64, ignoring embedded whitespace (PEM bodies and
/// pretty-printed XML both wrap lines).
///
/// # Errors
///
/// Returns the decoder's message when the input is not valid base64.
pub fn base64_decode(data: &str) -> Result<Vec<u8>, String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| e.to_string())
}

/// 32 random lowercase hex characters (128 bits from the OS CSPRNG).
#[must_use]
pub fn random_token() -> String {
    uuid::Uuid::new_v4().as_simple().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("  \t\n"));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn duplicates_are_case_insensitive_and_reported_once() {
        let dups = case_insensitive_duplicates(["Email", "phone", "EMAIL", "email"]);
        assert_eq!(dups, vec!["EMAIL"]);
    }

    #[test]
    fn no_duplicates_yields_empty() {
        assert!(case_insensitive_duplicates(["a", "b", "c"]).is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn base64_decode_ignores_line_breaks() {
        let encoded = base64_encode(b"certificate bytes");
        let wrapped = format!("{}\n  {}", &encoded[..8], &encoded[8..]);
        assert_eq!(base64_decode(&wrapped).unwrap(), b"certificate bytes");
    }

    #[test]
    fn random_token_is_32_hex_chars() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_token());
    }

    #[test]
    fn dedupe_sorts() {
        let mut v = vec!["b".to_owned(), "a".to_owned(), "b".to_owned()];
        dedupe_sorted(&mut v);
        assert_eq!(v, vec!["a", "b"]);
    }
}
