use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Authentication required: no credential configured for signed request")]
    AuthenticationRequired,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {status}: {body}")]
    TransportError { status: u16, body: String },

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl ExchangeError {
    /// Whether the request may have reached the exchange.
    ///
    /// `false` means the failure happened before any I/O, so the request is
    /// known not to have been processed. `true` means the caller must check
    /// exchange state before retrying a non-idempotent call.
    pub fn was_sent(&self) -> bool {
        match self {
            Self::InvalidParameter(_)
            | Self::SigningError(_)
            | Self::AuthenticationRequired
            | Self::InvalidState(_)
            | Self::JsonError(_)
            | Self::ConfigError(_) => false,
            Self::NetworkError(_)
            | Self::TransportError { .. }
            | Self::ConnectionClosed(_)
            | Self::Timeout(_)
            | Self::Cancelled(_) => true,
        }
    }

    /// Only transport-level failures are worth retrying, and only with a fresh
    /// timestamp and signature.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransportError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
