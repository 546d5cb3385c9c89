use domain::DomainError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("connect failed: {0}")]
    ConnectFailure(#[source] TransportError),
    #[error("publish failed: {0}")]
    PublishFailure(#[source] TransportError),
    #[error("token issue failed: {0}")]
    TokenIssue(String),
    #[error("room provisioning failed: {0}")]
    RoomProvisioning(String),
    #[error("token request failed: {0}")]
    TokenRequest(String),
    #[error("session closed")]
    SessionClosed,
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApplicationError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ApplicationError::Configuration(message.into())
    }

    /// 是否由调用方输入引起
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ApplicationError::Validation(_)
                | ApplicationError::Domain(DomainError::ValidationError { .. })
        )
    }
}
