//! Typed message dispatch.
//!
//! The node routes each `ClientMessage` by its `MessageKind` to exactly one
//! handler. Handlers receive a `ValidatedSender` and return the messages to
//! send as `Outbound` values; they never talk to the transport themselves.

use starport_types::{ClientId, ServerMessage};

/// A sender identity that came from the transport and belongs to a
/// connected client. Only the node constructs these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedSender(ClientId);

impl ValidatedSender {
    pub(crate) fn new(client: ClientId) -> Self {
        Self(client)
    }

    pub fn id(&self) -> ClientId {
        self.0
    }
}

/// A message produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Unicast(ClientId, ServerMessage),
    Broadcast(ServerMessage),
}

impl Outbound {
    pub fn message(&self) -> &ServerMessage {
        match self {
            Outbound::Unicast(_, m) | Outbound::Broadcast(m) => m,
        }
    }
}
