//! HTTP route modules for the `selfpass` server.
//!
//! Pages are JSON documents; a browser front end renders them.

pub mod config;
pub mod private;
pub mod public;

use serde::Deserialize;

/// Body of every form that submits a single password.
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
}

/// A return address is accepted only when it is a local absolute path.
pub fn safe_next(next: Option<&str>, fallback: &str) -> String {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .unwrap_or(fallback)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/private/setup-otp"), "/private/"), "/private/setup-otp");
        assert_eq!(safe_next(Some("//evil.example.com"), "/private/"), "/private/");
        assert_eq!(safe_next(Some("https://evil.example.com"), "/private/"), "/private/");
        assert_eq!(safe_next(None, "/private/"), "/private/");
    }
}
