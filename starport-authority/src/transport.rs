//! Transport abstraction for the authority node.
//!
//! The transport owns connection management and client identity. It must
//! deliver each sender's messages in order and report connects and
//! disconnects in order relative to that sender's messages. No ordering
//! across different senders is assumed.

use crate::error::AuthorityResult;
use async_trait::async_trait;
use starport_types::{ClientId, ClientMessage, ServerMessage};

/// Input delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected(ClientId),
    Disconnected(ClientId),
    /// `sender` is the identity the transport authenticated, not a claim.
    Message { sender: ClientId, message: ClientMessage },
}

/// Reliable ordered channel keyed by client identity.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Next inbound event, or `None` once the transport is closed.
    ///
    /// Must be cancel-safe: the node polls it inside `select!`.
    async fn recv(&self) -> Option<TransportEvent>;

    /// Sends to one client only.
    async fn send_to(&self, client: ClientId, message: ServerMessage) -> AuthorityResult<()>;

    /// Sends to every connected client.
    async fn broadcast(&self, message: ServerMessage) -> AuthorityResult<()>;
}
