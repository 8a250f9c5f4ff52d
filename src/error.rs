use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    cache::QueryError, config::LoadError, domain::DomainError, gateway::GatewayError,
    infra::error::InfraError, realtime::RealtimeError, session::AuthError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// The error and every source beneath it, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = StdError::source(self);
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_skips_transparent_duplicates() {
        let error = AppError::from(QueryError::from(GatewayError::transport("connection reset")));
        assert_eq!(error.chain(), vec!["transport error: connection reset".to_string()]);
    }
}
