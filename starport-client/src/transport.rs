//! Transport abstraction for a participant.

use crate::error::ClientResult;
use async_trait::async_trait;
use starport_types::{ClientMessage, ServerMessage};

/// Reliable ordered channel to the authority node.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Next message from the node, or `None` once disconnected.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    async fn recv(&self) -> Option<ServerMessage>;

    async fn send(&self, message: ClientMessage) -> ClientResult<()>;
}
