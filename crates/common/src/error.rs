use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transient send failure: {0}")]
    TransientSend(String),

    #[error("Configuration error: {0}")]
    ConfigurationInvalid(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Failure classes reported by the outbound chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl PlatformError {
    /// Retrying will not help: the bot lacks the rights for this action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlatformError::PermissionDenied(_))
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(msg) => AppError::ChannelNotFound(msg),
            PlatformError::PermissionDenied(msg) => AppError::PermissionDenied(msg),
            PlatformError::Transient(msg) => AppError::TransientSend(msg),
            PlatformError::Unexpected(msg) => AppError::Unexpected(msg),
        }
    }
}
