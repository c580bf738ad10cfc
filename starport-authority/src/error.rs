//! Authority node error types.
//!
//! Protocol outcomes (denied requests, ignored revokes, spawn failures) are
//! not errors. These variants cover misuse of the node API and broken plumbing.

use starport_types::ObjectId;
use thiserror::Error;

/// Result type for authority operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("operation requires the authority node")]
    NotAuthorityNode,

    #[error("unknown object: {0}")]
    UnknownObject(ObjectId),

    #[error("object already registered: {0}")]
    AlreadyRegistered(ObjectId),

    #[error("no gateway hosted by object {0}")]
    UnknownGateway(ObjectId),

    #[error("interaction policy failed: {0}")]
    Policy(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
