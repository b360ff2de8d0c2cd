//! `aes128gcm` content encoding for Web Push payloads (RFC 8188, RFC 8291).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use crate::error::NotifyError;

/// Record size advertised in the header. Push payloads always fit in one
/// record.
const RECORD_SIZE: u32 = 4096;
/// salt (16) + rs (4) + idlen (1) + uncompressed P-256 key (65)
pub const HEADER_LEN: usize = 86;
const TAG_LEN: usize = 16;
/// Largest plaintext that fits in a single record with its delimiter.
pub const MAX_PAYLOAD_LEN: usize = RECORD_SIZE as usize - HEADER_LEN - TAG_LEN - 1;

const WEBPUSH_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Content encryption key and nonce for one message.
pub(crate) struct ContentKeys {
    pub cek: [u8; 16],
    pub nonce: [u8; 12],
}

fn expand(hk: &Hkdf<Sha256>, info: &[u8], out: &mut [u8]) -> Result<(), NotifyError> {
    hk.expand(info, out)
        .map_err(|e| NotifyError::Encryption(e.to_string()))
}

/// Derives the per-message keys from the ECDH secret and the subscription's
/// auth secret.
pub(crate) fn derive_keys(
    shared_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<ContentKeys, NotifyError> {
    let mut info = Vec::with_capacity(WEBPUSH_INFO.len() + ua_public.len() + as_public.len());
    info.extend_from_slice(WEBPUSH_INFO);
    info.extend_from_slice(ua_public);
    info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    expand(
        &Hkdf::<Sha256>::new(Some(auth_secret), shared_secret),
        &info,
        &mut ikm,
    )?;

    let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut keys = ContentKeys {
        cek: [0u8; 16],
        nonce: [0u8; 12],
    };
    expand(&hk, CEK_INFO, &mut keys.cek)?;
    expand(&hk, NONCE_INFO, &mut keys.nonce)?;
    Ok(keys)
}

/// Fresh random P-256 key. Retries in the negligible case that 32 random
/// bytes are not a valid scalar.
pub(crate) fn ephemeral_secret() -> SecretKey {
    loop {
        if let Ok(secret) = SecretKey::from_slice(&rand::random::<[u8; 32]>()) {
            return secret;
        }
    }
}

/// Encrypts `payload` for a subscription.
///
/// `ua_public` is the subscription's uncompressed `p256dh` key and
/// `auth_secret` its 16-byte `auth` value. The output is the complete
/// request body: header followed by the single encrypted record.
///
/// # Errors
///
/// - [`NotifyError::PayloadTooLarge`] when `payload` exceeds
///   [`MAX_PAYLOAD_LEN`].
/// - [`NotifyError::InvalidKey`] for a malformed `ua_public`.
/// - [`NotifyError::Encryption`] if key derivation or sealing fails.
pub fn encrypt(payload: &[u8], ua_public: &[u8], auth_secret: &[u8]) -> Result<Vec<u8>, NotifyError> {
    encrypt_with(payload, ua_public, auth_secret, &ephemeral_secret(), rand::random())
}

pub(crate) fn encrypt_with(
    payload: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
    as_secret: &SecretKey,
    salt: [u8; 16],
) -> Result<Vec<u8>, NotifyError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(NotifyError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let ua_key = PublicKey::from_sec1_bytes(ua_public)
        .map_err(|e| NotifyError::InvalidKey(format!("p256dh: {e}")))?;
    let as_public = as_secret.public_key().to_encoded_point(false);
    let shared = diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());

    let keys = derive_keys(
        shared.raw_secret_bytes(),
        auth_secret,
        ua_public,
        as_public.as_bytes(),
        &salt,
    )?;

    // Single, final record: payload followed by the 0x02 delimiter.
    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(0x02);

    let cipher = Aes128Gcm::new_from_slice(&keys.cek)
        .map_err(|e| NotifyError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&keys.nonce), plaintext.as_slice())
        .map_err(|e| NotifyError::Encryption(e.to_string()))?;

    let key_id = as_public.as_bytes();
    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(u8::try_from(key_id.len()).map_err(|e| NotifyError::Encryption(e.to_string()))?);
    body.extend_from_slice(key_id);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Receiver side of the scheme, as a browser would run it.
    fn decrypt(body: &[u8], ua_secret: &SecretKey, auth_secret: &[u8]) -> Vec<u8> {
        let salt = &body[..16];
        let rs = u32::from_be_bytes(body[16..20].try_into().unwrap());
        assert_eq!(rs, RECORD_SIZE);
        let id_len = body[20] as usize;
        let as_public = &body[21..21 + id_len];
        let ciphertext = &body[21 + id_len..];

        let as_key = PublicKey::from_sec1_bytes(as_public).unwrap();
        let shared = diffie_hellman(ua_secret.to_nonzero_scalar(), as_key.as_affine());
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let keys = derive_keys(
            shared.raw_secret_bytes(),
            auth_secret,
            ua_public.as_bytes(),
            as_public,
            salt,
        )
        .unwrap();

        let cipher = Aes128Gcm::new_from_slice(&keys.cek).unwrap();
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(&keys.nonce), ciphertext)
            .unwrap();
        assert_eq!(plaintext.pop(), Some(0x02), "final record delimiter");
        plaintext
    }

    #[test]
    fn subscriber_can_decrypt_payload() {
        let ua_secret = ephemeral_secret();
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let auth: [u8; 16] = rand::random();

        let body = encrypt(br#"{"title":"Price drop"}"#, ua_public.as_bytes(), &auth).unwrap();

        assert_eq!(body[20], 65);
        assert_eq!(
            decrypt(&body, &ua_secret, &auth),
            br#"{"title":"Price drop"}"#.to_vec()
        );
    }

    fn b64(s: &str) -> Vec<u8> {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;
        URL_SAFE_NO_PAD.decode(s).unwrap()
    }

    /// RFC 8291 Appendix A.
    #[test]
    fn matches_rfc8291_example() {
        let plaintext = b"When I grow up, I want to be a watermelon";
        let as_secret =
            SecretKey::from_slice(&b64("yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw")).unwrap();
        let ua_secret =
            SecretKey::from_slice(&b64("q1dXpw3UpT5VOmu_cf_v6ih07Aems3njxI-JWgLcM94")).unwrap();
        let ua_public = b64(
            "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4",
        );
        let auth = b64("BTBZMqHH6r4Tts7J_aSIgg");
        let salt: [u8; 16] = b64("DGv6ra1nlYgDCS1FRnbzlw").try_into().unwrap();

        assert_eq!(
            ua_secret.public_key().to_encoded_point(false).as_bytes(),
            ua_public.as_slice()
        );

        let body = encrypt_with(plaintext, &ua_public, &auth, &as_secret, salt).unwrap();
        let expected = b64(
            "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInm\
             YWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNW\
             QexSgSxsj_Qulcy4a-fN",
        );
        assert_eq!(body, expected);
        assert_eq!(decrypt(&body, &ua_secret, &auth), plaintext.to_vec());
    }

    #[test]
    fn output_length_is_header_plus_sealed_record() {
        let ua_secret = ephemeral_secret();
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let body = encrypt_with(
            b"hello",
            ua_public.as_bytes(),
            &[7u8; 16],
            &ephemeral_secret(),
            [1u8; 16],
        )
        .unwrap();
        assert_eq!(body.len(), HEADER_LEN + 5 + 1 + TAG_LEN);
        assert_eq!(&body[..16], &[1u8; 16]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let ua_public = ephemeral_secret().public_key().to_encoded_point(false);
        let payload = vec![b'x'; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encrypt(&payload, ua_public.as_bytes(), &[0u8; 16]),
            Err(NotifyError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn malformed_subscriber_key_is_rejected() {
        assert!(matches!(
            encrypt(b"hi", &[4u8; 10], &[0u8; 16]),
            Err(NotifyError::InvalidKey(_))
        ));
    }
}
