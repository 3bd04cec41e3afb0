//! Error types for email notifications.

use thiserror::Error;

/// Shown to the user when no relay can be reached.
pub const NO_RELAY_WARNING: &str = "Your ISP is blocking communications over port 25 and has no \
listed SMTP server. As such it is impossible to send an email to you from this address. Sorry \
for the inconvenience.";

/// Errors that can occur while sending a notification.
#[derive(Debug, Error, Clone)]
pub enum NotifyError {
    /// Neither the provider relay nor an ISP relay is usable
    #[error("No reachable SMTP relay: {reason}")]
    RelayUnreachable { reason: String },

    /// The sender or recipient address could not be parsed
    #[error("Invalid email address: {message}")]
    InvalidAddress { message: String },

    /// The message could not be built
    #[error("Could not build message: {message}")]
    Message { message: String },

    /// Network/SMTP transport failed after a relay was selected
    #[error("Network error: {message}")]
    Network { message: String },
}

impl NotifyError {
    /// Returns true if the user needs to see the port 25 warning.
    pub fn is_relay_unreachable(&self) -> bool {
        matches!(self, NotifyError::RelayUnreachable { .. })
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Network {
            message: err.to_string(),
        }
    }
}

impl From<lettre::address::AddressError> for NotifyError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotifyError::InvalidAddress {
            message: err.to_string(),
        }
    }
}

impl From<lettre::error::Error> for NotifyError {
    fn from(err: lettre::error::Error) -> Self {
        NotifyError::Message {
            message: err.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for NotifyError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotifyError::Network {
            message: err.to_string(),
        }
    }
}
