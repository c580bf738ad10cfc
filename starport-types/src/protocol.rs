//! Wire protocol between participants and the authority node.
//!
//! Every message travels over a reliable channel that preserves order per
//! sender. Client messages carry an identity *claim*; the authority node
//! compares it with the sender identity reported by the transport before
//! touching any state.

use crate::geometry::{Transform, Vec3};
use crate::ids::{ActorRef, ClientId, ObjectId, RequestId, TemplateId};
use crate::ownership::OwnershipState;
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a `ClientMessage`, used to route to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RequestOwnership,
    RevokeOwnership,
    RequestInteract,
    ReportPosition,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::RequestOwnership => write!(f, "request_ownership"),
            MessageKind::RevokeOwnership => write!(f, "revoke_ownership"),
            MessageKind::RequestInteract => write!(f, "request_interact"),
            MessageKind::ReportPosition => write!(f, "report_position"),
        }
    }
}

/// Messages sent by participants to the authority node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to become the owner of `object`. Result is unicast, new state broadcast.
    RequestOwnership {
        object: ObjectId,
        requester: ClientId,
        request_id: RequestId,
    },
    /// Give up ownership of `object`. Ignored unless `requester` is the owner.
    RevokeOwnership {
        object: ObjectId,
        requester: ClientId,
    },
    /// Use the interactable hosted by `gateway`, acting as `actor`.
    RequestInteract {
        gateway: ObjectId,
        actor: ActorRef,
        sender: ClientId,
        request_id: RequestId,
    },
    /// Physics report for an object the sender owns.
    ReportPosition { object: ObjectId, position: Vec3 },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::RequestOwnership { .. } => MessageKind::RequestOwnership,
            ClientMessage::RevokeOwnership { .. } => MessageKind::RevokeOwnership,
            ClientMessage::RequestInteract { .. } => MessageKind::RequestInteract,
            ClientMessage::ReportPosition { .. } => MessageKind::ReportPosition,
        }
    }
}

/// Replicated state of an interactable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractableState {
    pub allowed: bool,
    pub description: String,
}

impl Default for InteractableState {
    fn default() -> Self {
        Self {
            allowed: true,
            description: "Interactable description".to_string(),
        }
    }
}

/// Why a spawn did not happen. Broadcast so observers can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnFailureReason {
    /// Another live instance occupies the spawn point.
    Blocked,
    /// The template's population cap is already reached.
    LimitReached,
}

impl fmt::Display for SpawnFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnFailureReason::Blocked => write!(f, "spawn point blocked"),
            SpawnFailureReason::LimitReached => write!(f, "population limit reached"),
        }
    }
}

/// Messages sent by the authority node, either unicast or broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Unicast answer to `RequestOwnership`.
    OwnershipResult {
        object: ObjectId,
        request_id: RequestId,
        granted: bool,
    },
    /// Broadcast after every ownership transition.
    OwnershipChanged {
        object: ObjectId,
        state: Versioned<OwnershipState>,
    },
    /// Unicast answer to `RequestInteract`.
    InteractResult {
        gateway: ObjectId,
        request_id: RequestId,
        success: bool,
    },
    /// Broadcast after the interactable flag or description changed.
    InteractableChanged {
        gateway: ObjectId,
        state: Versioned<InteractableState>,
    },
    /// A new object exists under authority, initially unowned.
    SpawnNotify {
        object: ObjectId,
        template: TemplateId,
        transform: Transform,
    },
    SpawnFailed {
        template: TemplateId,
        reason: SpawnFailureReason,
    },
    Despawned { object: ObjectId },
    /// A player character was created for `owner`.
    ActorAssigned {
        actor: ActorRef,
        owner: ClientId,
        transform: Transform,
    },
    ActorRemoved { actor: ActorRef },
    DisposalStarted { disposer: ObjectId, pending: usize },
    DisposalCompleted { disposer: ObjectId, disposed: usize },
    /// A disposal was requested while another one was running.
    DisposalRejected { disposer: ObjectId },
}
