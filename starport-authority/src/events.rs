//! Events emitted by the authority node for host-side game logic.

use crate::reconciler::ReconcileReport;
use crate::registry::ChangeCause;
use crate::spawn::Spawned;
use starport_types::{ActorRef, ClientId, ObjectId, OwnershipState, TemplateId, Versioned};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorityEvent {
    ClientConnected {
        client: ClientId,
        actor: ActorRef,
    },
    ClientDisconnected {
        report: ReconcileReport,
    },
    OwnershipChanged {
        object: ObjectId,
        state: Versioned<OwnershipState>,
        cause: ChangeCause,
    },
    /// Someone used an interactable. Fired once per accepted request, after the policy ran.
    InteractionUsed {
        gateway: ObjectId,
        requester: ClientId,
        actor: ActorRef,
        success: bool,
    },
    SpawnSucceeded(Spawned),
    SpawnBlocked {
        template: TemplateId,
    },
    SpawnLimitReached {
        template: TemplateId,
    },
    Despawned {
        object: ObjectId,
    },
    DisposalStarted {
        gateway: ObjectId,
        items: Vec<ObjectId>,
    },
    DisposalCompleted {
        gateway: ObjectId,
        disposed: usize,
    },
    DisposalRejected {
        gateway: ObjectId,
    },
}
