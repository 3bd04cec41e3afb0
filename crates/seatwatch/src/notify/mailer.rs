//! SMTP delivery.

use super::error::NotifyError;
use super::message::Email;
use async_trait::async_trait;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

/// Hands messages to an SMTP relay.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns true if an SMTP session can be opened with `relay`.
    async fn probe(&self, relay: &str) -> bool;

    async fn send(&self, relay: &str, email: &Email) -> Result<(), NotifyError>;
}

/// Plain SMTP (no auth, no TLS) straight to a relay.
pub struct SmtpMailer {
    port: u16,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    fn transport(&self, relay: &str) -> AsyncSmtpTransport<Tokio1Executor> {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay)
            .port(self.port)
            .timeout(Some(self.timeout))
            .build()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn probe(&self, relay: &str) -> bool {
        match self.transport(relay).test_connection().await {
            Ok(connected) => connected,
            Err(e) => {
                debug!(relay = %relay, port = self.port, error = %e, "SMTP probe failed");
                false
            }
        }
    }

    async fn send(&self, relay: &str, email: &Email) -> Result<(), NotifyError> {
        let message = email.to_message()?;
        self.transport(relay).send(message).await?;

        info!(relay = %relay, to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}
