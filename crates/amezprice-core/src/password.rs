//! Argon2id password hashing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::CoreError;

/// Hashes `password` into a PHC string with a fresh random salt.
///
/// # Errors
///
/// Returns [`CoreError::PasswordHash`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| CoreError::PasswordHash(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Well-formed Argon2id hash with the default parameters that no password is
/// expected to match. Logins for unknown or inactive accounts verify against
/// it so they take as long as a real check.
pub const UNMATCHABLE_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$JeqaRk6vW7DAG11WQHPkUg$E7ZSu7oH9jz6unI1Xs/g9avMm5fiZQDOPjGOWPmA/B0";

/// Whether `password` matches the stored PHC string. A malformed hash never
/// matches.
#[must_use]
pub fn verify_password(password: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_uses_argon2id() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse battery", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unmatchable_hash_costs_a_default_verification() {
        let parsed = PasswordHash::new(UNMATCHABLE_HASH).unwrap();
        assert_eq!(parsed.algorithm, argon2::Algorithm::Argon2id.ident());

        let params = argon2::Params::try_from(&parsed).unwrap();
        let defaults = argon2::Params::default();
        assert_eq!(params.m_cost(), defaults.m_cost());
        assert_eq!(params.t_cost(), defaults.t_cost());
        assert_eq!(params.p_cost(), defaults.p_cost());

        assert!(!verify_password("", UNMATCHABLE_HASH));
        assert!(!verify_password("correct horse battery", UNMATCHABLE_HASH));
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
