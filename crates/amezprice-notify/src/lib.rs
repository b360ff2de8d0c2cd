//! Outbound notifications: SMTP email and Web Push, with message templates.

pub mod email;
pub mod error;
pub mod push;
pub mod retry;
pub mod templates;

use amezprice_core::AppConfig;

pub use email::{Delivery, EmailMessage, EmailSender};
pub use error::NotifyError;
pub use push::{PushPayload, PushSender, PushTarget};
pub use retry::retry_with_delay;

/// How many times a delivery is retried and the base of its linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.notify_max_retries,
            base_delay_ms: config.notify_retry_delay_ms,
        }
    }
}

/// Both senders, built from configuration. Missing SMTP or VAPID settings
/// yield a sender that skips delivery.
pub struct Notifier {
    pub email: EmailSender,
    pub push: PushSender,
}

impl Notifier {
    /// # Errors
    ///
    /// Returns [`NotifyError`] when configured credentials are invalid.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, NotifyError> {
        let retry = RetryPolicy::from_app_config(config);
        Ok(Self {
            email: EmailSender::from_config(config.smtp.as_ref(), retry)?,
            push: PushSender::from_config(config.vapid.as_ref(), retry, config.http_timeout_secs)?,
        })
    }

    /// Senders that never deliver anything.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the HTTP client cannot be built.
    pub fn disabled() -> Result<Self, NotifyError> {
        Ok(Self {
            email: EmailSender::from_config(None, RetryPolicy::none())?,
            push: PushSender::disabled()?,
        })
    }
}
