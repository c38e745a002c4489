//! Shared error type across mqguard crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Request rejected by an allow/disallow rule or a quota.
    Blocked,
    /// Topic failed length or tokenizer validation.
    InvalidTopic,
    /// Publish stream exceeded the data ceiling.
    PayloadTooLarge,
    /// Attach/detach misuse or tokenizer mismatch.
    Lifecycle,
    /// Invalid configuration.
    BadConfig,
    /// Internal error.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and wire responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Blocked => "BLOCKED",
            ClientCode::InvalidTopic => "INVALID_TOPIC",
            ClientCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ClientCode::Lifecycle => "LIFECYCLE",
            ClientCode::BadConfig => "BAD_CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MqGuardError>;

/// Unified error type used by core and engine.
///
/// `Clone` because a single stream overflow is reported both on the data
/// stream and through the publish completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqGuardError {
    #[error("{0}")]
    Blocked(String),
    #[error("{0}")]
    InvalidTopic(String),
    #[error("{0}")]
    DataLimit(String),
    #[error("server has access control")]
    AlreadyAttached,
    #[error("options mismatch")]
    OptionsMismatch,
    #[error("server has no access control")]
    NotAttached,
    #[error("block registry belongs to another broker")]
    ForeignRegistry,
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MqGuardError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MqGuardError::Blocked(_) => ClientCode::Blocked,
            MqGuardError::InvalidTopic(_) => ClientCode::InvalidTopic,
            MqGuardError::DataLimit(_) => ClientCode::PayloadTooLarge,
            MqGuardError::AlreadyAttached
            | MqGuardError::OptionsMismatch
            | MqGuardError::NotAttached
            | MqGuardError::ForeignRegistry => ClientCode::Lifecycle,
            MqGuardError::BadConfig(_) => ClientCode::BadConfig,
            MqGuardError::Internal(_) => ClientCode::Internal,
        }
    }
}
