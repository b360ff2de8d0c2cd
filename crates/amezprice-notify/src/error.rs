use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("invalid email address \"{address}\": {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push service returned HTTP {status}: {body}")]
    PushRejected { status: u16, body: String },

    #[error("push subscription is gone (HTTP {status})")]
    SubscriptionGone { status: u16 },

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("payload encryption failed: {0}")]
    Encryption(String),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    /// Whether a later attempt could succeed without any change on our side.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Smtp(e) => !e.is_permanent() && !e.is_client(),
            NotifyError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NotifyError::PushRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
