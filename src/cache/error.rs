use thiserror::Error;

use crate::gateway::GatewayError;

/// Error state of a cached query, shared by every reader of the key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("cached value for {key} has an unexpected type")]
    TypeMismatch { key: String },
    #[error("query {key} is no longer tracked")]
    Closed { key: String },
}

impl QueryError {
    pub fn gateway(&self) -> Option<&GatewayError> {
        match self {
            Self::Gateway(err) => Some(err),
            _ => None,
        }
    }
}
