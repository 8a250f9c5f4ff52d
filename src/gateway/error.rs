use happylife_types::Collection;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a backend call.
///
/// Cloneable so a single failed fetch can be handed to every reader that
/// shared it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    #[error("not authorized: {message}")]
    Authorization { message: String },
    #[error("`{collection}` record {id} not found")]
    NotFound { collection: Collection, id: Uuid },
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode backend response: {message}")]
    Decode { message: String },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        Self::Transport {
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_retry() {
        assert!(GatewayError::transport("connection reset").is_retryable());
        assert!(
            GatewayError::Transport {
                status: Some(503),
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(!GatewayError::authorization("expired").is_retryable());
        assert!(!GatewayError::rejected(400, "bad filter").is_retryable());
        assert!(!GatewayError::decode("eof").is_retryable());
    }
}
