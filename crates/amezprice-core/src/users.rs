use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// Usernames are 3–32 ASCII letters, digits, or underscores.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] describing the first rule violated.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(CoreError::Validation {
            field: "username",
            reason: format!("must be {USERNAME_MIN}-{USERNAME_MAX} characters"),
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(CoreError::Validation {
            field: "username",
            reason: "may only contain letters, digits, and underscores".to_string(),
        });
    }
    Ok(())
}

/// Structural email check: one `@`, a non-empty local part, and a dotted
/// domain with no empty labels.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the address is malformed.
pub fn validate_email(email: &str) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::Validation {
        field: "email",
        reason: reason.to_string(),
    };

    if email.len() > EMAIL_MAX {
        return Err(invalid("is too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid("must contain exactly one '@'"));
    };

    if local.is_empty() {
        return Err(invalid("is missing the part before '@'"));
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(invalid("has an invalid domain"));
    }
    Ok(())
}

/// Passwords are 8–128 characters.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if the length is out of range.
pub fn validate_password(password: &str) -> Result<(), CoreError> {
    let len = password.chars().count();
    if (PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        Ok(())
    } else {
        Err(CoreError::Validation {
            field: "password",
            reason: format!("must be {PASSWORD_MIN}-{PASSWORD_MAX} characters"),
        })
    }
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.as_str(), "user");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn username_accepts_word_characters() {
        assert!(validate_username("price_watcher42").is_ok());
    }

    #[test]
    fn username_rejects_short_and_long() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn username_rejects_symbols() {
        let err = validate_username("bad-name").unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "username", .. }));
    }

    #[test]
    fn email_accepts_common_addresses() {
        assert!(validate_email("someone@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.co.in").is_ok());
    }

    #[test]
    fn email_rejects_malformed() {
        for bad in [
            "no-at-sign",
            "@example.com",
            "two@@example.com",
            "a@b@example.com",
            "user@localhost",
            "user@example..com",
            "user @example.com",
        ] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Someone@Example.COM "), "someone@example.com");
    }
}
