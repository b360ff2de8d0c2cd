//! SMTP delivery via `lettre`.
//!
//! Without SMTP configuration the sender runs in log-only mode: messages are
//! logged and reported as [`Delivery::Skipped`].

use amezprice_core::SmtpConfig;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::NotifyError;
use crate::retry::retry_with_delay;
use crate::RetryPolicy;

/// Implicit-TLS SMTP port; any other port negotiates STARTTLS.
const SMTPS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Outcome of a delivery attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The channel is not configured; nothing was sent.
    Skipped,
}

pub struct EmailSender {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    retry: RetryPolicy,
}

fn parse_address(address: &str) -> Result<Address, NotifyError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|source| NotifyError::Address {
            address: address.to_owned(),
            source,
        })
}

impl EmailSender {
    /// Builds an SMTP sender from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Smtp`] if the relay cannot be configured, or
    /// [`NotifyError::Address`] for an invalid sender address.
    pub fn new(config: &SmtpConfig, retry: RetryPolicy) -> Result<Self, NotifyError> {
        let builder = if config.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            parse_address(&config.from_email)?,
        );

        Ok(Self {
            transport: Some(transport),
            from,
            retry,
        })
    }

    /// A sender that only logs. Used when SMTP is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Address`] if `from_email` is invalid.
    pub fn log_only(from_email: &str, from_name: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            transport: None,
            from: Mailbox::new(Some(from_name.to_owned()), parse_address(from_email)?),
            retry: RetryPolicy::none(),
        })
    }

    /// SMTP sender when `config` is present, log-only otherwise.
    ///
    /// # Errors
    ///
    /// See [`EmailSender::new`].
    pub fn from_config(
        config: Option<&SmtpConfig>,
        retry: RetryPolicy,
    ) -> Result<Self, NotifyError> {
        match config {
            Some(config) => Self::new(config, retry),
            None => {
                tracing::warn!("SMTP not configured; emails will be logged, not sent");
                Self::log_only("no-reply@amezprice.local", "AmezPrice")
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Renders `email` into a MIME message (plain text + HTML alternative).
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Address`] for an invalid recipient, or
    /// [`NotifyError::Message`] if the message cannot be assembled.
    pub fn build_message(&self, email: &EmailMessage) -> Result<Message, NotifyError> {
        let to = Mailbox::new(email.to_name.clone(), parse_address(&email.to)?);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text_body.clone(),
                email.html_body.clone(),
            ))?;
        Ok(message)
    }

    /// Sends `email`, retrying transient SMTP failures.
    ///
    /// # Errors
    ///
    /// Returns the final [`NotifyError`] when delivery fails permanently or
    /// retries run out.
    pub async fn send(&self, email: &EmailMessage) -> Result<Delivery, NotifyError> {
        let message = self.build_message(email)?;

        let Some(transport) = &self.transport else {
            tracing::info!(to = %email.to, subject = %email.subject, "email (log-only mode)");
            return Ok(Delivery::Skipped);
        };

        retry_with_delay(self.retry.max_retries, self.retry.base_delay_ms, || {
            let message = message.clone();
            async move {
                transport.send(message).await?;
                Ok(())
            }
        })
        .await
        .inspect_err(|e| tracing::error!(to = %email.to, error = %e, "email delivery failed"))?;

        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(Delivery::Sent)
    }
}
