//! Error types for catalog scraping.

use super::types::Term;
use thiserror::Error;

/// Errors that can occur while fetching seat information.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    /// No heading on the listing page mentions the requested section
    #[error("{section} does not match any existing sections for {subject} {number} in the {term} term")]
    NotFound {
        section: String,
        subject: String,
        number: u32,
        term: Term,
    },

    /// The page did not have the expected structure
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    Url { message: String },
}

impl FetchError {
    /// Returns true if a later attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        FetchError::Parse {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::Url {
            message: err.to_string(),
        }
    }
}
