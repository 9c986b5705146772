//! Error types for whatsapp-gateway
//!
//! Handler-level failures map onto HTTP status codes in `server`:
//! Validation -> 400, NotReady -> 503, Unregistered -> 400 (structured),
//! Upstream -> 500.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("WhatsApp session is not connected")]
    NotReady,

    #[error("number is not registered on WhatsApp")]
    Unregistered { formatted: String },

    #[error("engine call failed: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
