//! Email notifications for seat openings.
//!
//! Relay selection:
//! 1. Guess the recipient provider's inbound relay from the address
//! 2. If it cannot be reached (port 25 is often blocked), look up the
//!    sender's ISP and use that ISP's relay
//! 3. Otherwise give up with [`NotifyError::RelayUnreachable`]

mod error;
mod isp;
mod mailer;
mod message;
mod relay;

pub use error::{NotifyError, NO_RELAY_WARNING};
pub use isp::{parse_isp_name, IspLookup, WebIspLookup, ISP_LOOKUP_URL};
pub use mailer::{Mailer, SmtpMailer};
pub use message::{Email, Opening, OpeningKind, DEFAULT_FROM};
pub use relay::{domain_label, relay_for_address, relay_for_isp, DEFAULT_RELAY};

use crate::catalog::CourseQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for notification delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// `From` header of outgoing mail
    pub from_address: String,
    pub smtp_port: u16,
    /// Connect/command timeout for SMTP sessions
    pub smtp_timeout_secs: u64,
    pub isp_lookup_url: String,
    pub isp_lookup_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            from_address: DEFAULT_FROM.to_string(),
            smtp_port: 25,
            smtp_timeout_secs: 3,
            isp_lookup_url: ISP_LOOKUP_URL.to_string(),
            isp_lookup_timeout_secs: 10,
        }
    }
}

/// Anything that can tell a user about an opening.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        address: &str,
        opening: Opening,
        query: &CourseQuery,
    ) -> Result<(), NotifyError>;
}

/// Sends opening notices by email.
pub struct NotificationSender {
    mailer: Box<dyn Mailer>,
    isp_lookup: Box<dyn IspLookup>,
    from_address: String,
}

impl NotificationSender {
    /// Creates a sender that talks SMTP and scrapes the configured ISP page.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let mailer = SmtpMailer::new(
            config.smtp_port,
            Duration::from_secs(config.smtp_timeout_secs),
        );
        let isp_lookup = WebIspLookup::new(
            config.isp_lookup_url.clone(),
            Duration::from_secs(config.isp_lookup_timeout_secs),
        )?;

        Ok(Self::new(
            Box::new(mailer),
            Box::new(isp_lookup),
            config.from_address.clone(),
        ))
    }

    pub fn new(
        mailer: Box<dyn Mailer>,
        isp_lookup: Box<dyn IspLookup>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            isp_lookup,
            from_address: from_address.into(),
        }
    }

    /// Picks a relay that accepts connections, trying the ISP fallback once.
    async fn select_relay(&self, address: &str) -> Result<String, NotifyError> {
        let primary = relay_for_address(address);
        if self.mailer.probe(primary).await {
            return Ok(primary.to_string());
        }

        warn!(relay = %primary, "Provider relay unreachable, trying ISP relay");

        let isp = self
            .isp_lookup
            .isp_name()
            .await
            .map_err(|e| NotifyError::RelayUnreachable {
                reason: format!("{primary} unreachable and ISP lookup failed ({e})"),
            })?;

        let fallback = relay_for_isp(&isp).ok_or_else(|| NotifyError::RelayUnreachable {
            reason: format!("{primary} unreachable and no relay is known for ISP '{isp}'"),
        })?;

        if !self.mailer.probe(fallback).await {
            return Err(NotifyError::RelayUnreachable {
                reason: format!("{primary} and ISP relay {fallback} are both unreachable"),
            });
        }

        info!(relay = %fallback, isp = %isp, "Using ISP relay");
        Ok(fallback.to_string())
    }
}

#[async_trait]
impl Notifier for NotificationSender {
    async fn notify(
        &self,
        address: &str,
        opening: Opening,
        query: &CourseQuery,
    ) -> Result<(), NotifyError> {
        let email = Email::opening_notice(&self.from_address, address, opening, query)?;
        let relay = self.select_relay(address).await?;

        info!(course = %query, opening = %opening, relay = %relay, "Sending opening notice");
        self.mailer.send(&relay, &email).await
    }
}
