//! AWS Signature Version 4 (`AWS4-HMAC-SHA256`) request signing, as required
//! by PA-API 5.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::MarketplaceError;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Who is signing, and for which AWS region/service.
#[derive(Debug, Clone, Copy)]
pub struct SigningScope<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// The parts of an HTTP request covered by the signature.
///
/// `headers` must include `host` and `x-amz-date`; names are lowercased and
/// sorted during canonicalization.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Already-canonical query string (sorted, encoded), or empty.
    pub query: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

/// `x-amz-date` header value for `timestamp`.
#[must_use]
pub fn amz_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, MarketplaceError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| MarketplaceError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives the per-day signing key.
///
/// # Errors
///
/// Returns [`MarketplaceError::Signing`] if HMAC initialization fails.
pub fn signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, MarketplaceError> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Returns `(canonical_headers, signed_headers)`.
fn canonicalize_headers(headers: &[(&str, &str)]) -> (String, String) {
    let mut normalized: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.to_ascii_lowercase(), value)
        })
        .collect();
    normalized.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical = normalized
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    let signed = normalized
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}

/// Computes the `Authorization` header value for `request`.
///
/// # Errors
///
/// Returns [`MarketplaceError::Signing`] if HMAC initialization fails.
pub fn authorization_header(
    scope: &SigningScope<'_>,
    request: &CanonicalRequest<'_>,
    timestamp: DateTime<Utc>,
) -> Result<String, MarketplaceError> {
    let amz_date = amz_date(timestamp);
    let date_stamp = timestamp.format("%Y%m%d").to_string();

    let (canonical_headers, signed_headers) = canonicalize_headers(request.headers);
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        canonical_headers,
        signed_headers,
        sha256_hex(request.payload),
    );

    let credential_scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        scope.region, scope.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(scope.secret_key, &date_stamp, scope.region, scope.service)?;
    let signature: String = hmac_sha256(&key, string_to_sign.as_bytes())?
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    Ok(format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        scope.access_key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn signing_key_matches_published_example() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex(&key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn get_vanilla_signature_matches_test_suite() {
        let timestamp = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let scope = SigningScope {
            access_key: "AKIDEXAMPLE",
            secret_key: EXAMPLE_SECRET,
            region: "us-east-1",
            service: "service",
        };
        let date = amz_date(timestamp);
        let headers = [("Host", "example.amazonaws.com"), ("X-Amz-Date", date.as_str())];
        let request = CanonicalRequest {
            method: "GET",
            path: "/",
            query: "",
            headers: &headers,
            payload: b"",
        };

        let auth = authorization_header(&scope, &request, timestamp).unwrap();
        assert_eq!(
            auth,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn header_values_are_trimmed_and_sorted() {
        let (canonical, signed) =
            canonicalize_headers(&[("X-B", "  two   words "), ("a", "1")]);
        assert_eq!(canonical, "a:1\nx-b:two words\n");
        assert_eq!(signed, "a;x-b");
    }
}
