//! Session tokens and the session cookie.
//!
//! The raw token only ever lives in the client's cookie; the database keeps
//! its SHA-256 hex digest.

use axum::http::{header::COOKIE, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE: &str = "amezprice_session";

/// Cookie behaviour derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub rotate_secs: u64,
    /// Adds `Secure`; off in development so plain-HTTP localhost works.
    pub secure_cookie: bool,
}

impl SessionSettings {
    #[must_use]
    pub fn from_app_config(config: &amezprice_core::AppConfig) -> Self {
        Self {
            ttl_secs: config.session_ttl_secs,
            rotate_secs: config.session_rotate_secs,
            secure_cookie: !matches!(config.env, amezprice_core::Environment::Development),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX / 1000))
    }

    #[must_use]
    pub fn rotate_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.rotate_secs).unwrap_or(i64::MAX / 1000))
    }
}

/// 256 random bits, base64url without padding.
#[must_use]
pub fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

#[must_use]
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Value of the session cookie, if the request carries one.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn session_cookie(token: &str, settings: &SessionSettings) -> String {
    let secure = if settings.secure_cookie { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        settings.ttl_secs
    )
}

#[must_use]
pub fn clear_session_cookie(settings: &SessionSettings) -> String {
    let secure = if settings.secure_cookie { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{secure}")
}

/// Best-effort client address for session bookkeeping.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(64).collect())
}

#[must_use]
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(512).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings(secure_cookie: bool) -> SessionSettings {
        SessionSettings {
            ttl_secs: 3600,
            rotate_secs: 900,
            secure_cookie,
        }
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn session_token_is_found_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; amezprice_session=tok123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn empty_or_missing_cookie_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(COOKIE, HeaderValue::from_static("amezprice_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn cookie_attributes_follow_environment() {
        let dev = session_cookie("t", &settings(false));
        assert!(dev.contains("HttpOnly"));
        assert!(dev.contains("SameSite=Lax"));
        assert!(!dev.contains("Secure"));

        let prod = session_cookie("t", &settings(true));
        assert!(prod.ends_with("; Secure"));
        assert!(clear_session_cookie(&settings(true)).contains("Max-Age=0"));
    }

    #[test]
    fn client_ip_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
