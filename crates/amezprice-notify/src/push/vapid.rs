//! VAPID (RFC 8292): an ES256-signed JWT identifying the application server
//! to the push service.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use reqwest::Url;
use serde::Serialize;

use crate::error::NotifyError;

/// Push services reject tokens valid for more than 24 hours.
const TOKEN_LIFETIME_HOURS: i64 = 12;

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Decodes base64url with or without padding, as browsers and key tools
/// disagree on it.
pub fn decode_b64url(value: &str) -> Result<Vec<u8>, NotifyError> {
    URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| NotifyError::InvalidKey(e.to_string()))
}

pub struct VapidSigner {
    key: SigningKey,
    /// base64url uncompressed public key, sent as `k=`.
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidKey`] when the private key is not a
    /// 32-byte P-256 scalar or does not match `public_key`.
    pub fn new(private_key: &str, public_key: &str, subject: &str) -> Result<Self, NotifyError> {
        let key = SigningKey::from_slice(&decode_b64url(private_key)?)
            .map_err(|e| NotifyError::InvalidKey(format!("VAPID private key: {e}")))?;

        let derived = key.verifying_key().to_encoded_point(false);
        if decode_b64url(public_key)? != derived.as_bytes() {
            return Err(NotifyError::InvalidKey(
                "VAPID public key does not match the private key".to_owned(),
            ));
        }

        Ok(Self {
            key,
            public_key: URL_SAFE_NO_PAD.encode(derived.as_bytes()),
            subject: subject.to_owned(),
        })
    }

    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Signed JWT for the push service hosting `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidKey`] if `endpoint` has no origin, or
    /// [`NotifyError::Json`] if the claims cannot be encoded.
    pub fn token(&self, endpoint: &Url, now: DateTime<Utc>) -> Result<String, NotifyError> {
        let origin = endpoint.origin();
        if !origin.is_tuple() {
            return Err(NotifyError::InvalidKey(format!(
                "push endpoint has no origin: {endpoint}"
            )));
        }
        let audience = origin.ascii_serialization();

        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT","alg":"ES256"}"#);
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Claims {
            aud: &audience,
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            sub: &self.subject,
        })?);

        let signing_input = format!("{header}.{claims}");
        let signature: Signature = self.key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// `Authorization` header value for `endpoint`.
    ///
    /// # Errors
    ///
    /// See [`VapidSigner::token`].
    pub fn authorization(&self, endpoint: &Url, now: DateTime<Utc>) -> Result<String, NotifyError> {
        Ok(format!(
            "vapid t={}, k={}",
            self.token(endpoint, now)?,
            self.public_key
        ))
    }
}

/// Generates a new VAPID key pair as `(public, private)` base64url strings.
#[must_use]
pub fn generate_keys() -> (String, String) {
    let secret = super::ece::ephemeral_secret();
    let public = secret.public_key().to_encoded_point(false);
    (
        URL_SAFE_NO_PAD.encode(public.as_bytes()),
        URL_SAFE_NO_PAD.encode(secret.to_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    fn signer() -> VapidSigner {
        let (public, private) = generate_keys();
        VapidSigner::new(&private, &public, "mailto:ops@amezprice.in").unwrap()
    }

    #[test]
    fn token_is_verifiable_es256_jwt() {
        let signer = signer();
        let endpoint = Url::parse("https://fcm.googleapis.com/fcm/send/abc123").unwrap();
        let now = Utc::now();
        let token = signer.token(&endpoint, now).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims: serde_json::Value =
            serde_json::from_slice(&decode_b64url(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://fcm.googleapis.com");
        assert_eq!(claims["sub"], "mailto:ops@amezprice.in");
        assert_eq!(claims["exp"], (now + Duration::hours(12)).timestamp());

        let verifying =
            VerifyingKey::from_sec1_bytes(&decode_b64url(signer.public_key()).unwrap()).unwrap();
        let signature = Signature::from_slice(&decode_b64url(parts[2]).unwrap()).unwrap();
        verifying
            .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
            .expect("signature verifies");
    }

    #[test]
    fn authorization_header_carries_token_and_key() {
        let signer = signer();
        let endpoint = Url::parse("https://updates.push.services.mozilla.com/wpush/v2/x").unwrap();
        let header = signer.authorization(&endpoint, Utc::now()).unwrap();
        assert!(header.starts_with("vapid t="));
        assert!(header.ends_with(&format!(", k={}", signer.public_key())));
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let (_, private) = generate_keys();
        let (other_public, _) = generate_keys();
        assert!(matches!(
            VapidSigner::new(&private, &other_public, "mailto:x@y.z"),
            Err(NotifyError::InvalidKey(_))
        ));
    }

    #[test]
    fn padded_base64_is_accepted() {
        assert_eq!(decode_b64url("AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_b64url("AQI=").unwrap(), vec![1, 2]);
    }
}
