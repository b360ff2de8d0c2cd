//! Web Push delivery with VAPID authentication and encrypted payloads.

pub mod ece;
pub mod vapid;

use std::time::Duration;

use amezprice_core::VapidConfig;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::email::Delivery;
use crate::error::NotifyError;
use crate::retry::retry_with_delay;
use crate::RetryPolicy;
pub use vapid::{decode_b64url, generate_keys, VapidSigner};

/// Seconds the push service should hold an undelivered message.
const DEFAULT_TTL_SECS: u32 = 86_400;

/// JSON body shown by the service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// The parts of a browser `PushSubscription` needed to deliver to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub endpoint: String,
    /// base64url uncompressed P-256 public key.
    pub p256dh: String,
    /// base64url 16-byte auth secret.
    pub auth: String,
}

pub struct PushSender {
    client: Client,
    signer: Option<VapidSigner>,
    retry: RetryPolicy,
    ttl_secs: u32,
}

impl PushSender {
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidKey`] for bad VAPID keys, or
    /// [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(
        config: &VapidConfig,
        retry: RetryPolicy,
        timeout_secs: u64,
    ) -> Result<Self, NotifyError> {
        let signer = VapidSigner::new(&config.private_key, &config.public_key, &config.subject)?;
        Ok(Self {
            client: build_client(timeout_secs)?,
            signer: Some(signer),
            retry,
            ttl_secs: DEFAULT_TTL_SECS,
        })
    }

    /// A sender with no VAPID keys; every send is [`Delivery::Skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn disabled() -> Result<Self, NotifyError> {
        Ok(Self {
            client: build_client(10)?,
            signer: None,
            retry: RetryPolicy::none(),
            ttl_secs: DEFAULT_TTL_SECS,
        })
    }

    /// # Errors
    ///
    /// See [`PushSender::new`].
    pub fn from_config(
        config: Option<&VapidConfig>,
        retry: RetryPolicy,
        timeout_secs: u64,
    ) -> Result<Self, NotifyError> {
        match config {
            Some(config) => Self::new(config, retry, timeout_secs),
            None => {
                tracing::warn!("VAPID keys not configured; web push disabled");
                Self::disabled()
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Public key browsers pass as `applicationServerKey`.
    #[must_use]
    pub fn vapid_public_key(&self) -> Option<&str> {
        self.signer.as_ref().map(VapidSigner::public_key)
    }

    /// Encrypts and posts `payload` to one subscription.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::SubscriptionGone`] on 404/410; the caller should
    ///   delete the subscription.
    /// - [`NotifyError::PushRejected`] for other non-2xx statuses, after
    ///   retrying 429 and 5xx.
    /// - [`NotifyError::InvalidKey`] / [`NotifyError::Encryption`] for bad
    ///   subscription keys.
    pub async fn send(
        &self,
        target: &PushTarget,
        payload: &PushPayload,
    ) -> Result<Delivery, NotifyError> {
        let Some(signer) = &self.signer else {
            tracing::debug!(endpoint = %target.endpoint, "web push disabled, skipping");
            return Ok(Delivery::Skipped);
        };

        let endpoint = Url::parse(&target.endpoint)
            .map_err(|e| NotifyError::InvalidKey(format!("endpoint: {e}")))?;
        let ua_public = decode_b64url(&target.p256dh)?;
        let auth = decode_b64url(&target.auth)?;
        let json = serde_json::to_vec(payload)?;

        retry_with_delay(self.retry.max_retries, self.retry.base_delay_ms, || {
            self.post(signer, &endpoint, &json, &ua_public, &auth)
        })
        .await?;

        tracing::debug!(endpoint = %target.endpoint, "push delivered");
        Ok(Delivery::Sent)
    }

    async fn post(
        &self,
        signer: &VapidSigner,
        endpoint: &Url,
        payload: &[u8],
        ua_public: &[u8],
        auth: &[u8],
    ) -> Result<(), NotifyError> {
        // Each attempt gets a fresh salt and ephemeral key.
        let body = ece::encrypt(payload, ua_public, auth)?;
        let authorization = signer.authorization(endpoint, Utc::now())?;

        let response = self
            .client
            .post(endpoint.clone())
            .header("Authorization", authorization)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("TTL", self.ttl_secs.to_string())
            .header("Urgency", "normal")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(NotifyError::SubscriptionGone {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::PushRejected {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        })
    }
}

fn build_client(timeout_secs: u64) -> Result<Client, NotifyError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}
