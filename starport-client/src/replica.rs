//! Local, read-only view of replicated authority state.
//!
//! Updates are version-gated: a snapshot replaces the cached one only when
//! its version is strictly newer, so a duplicated or reordered broadcast never
//! rolls the view back. The view may lag the authority node by a round trip;
//! callers treat an "unowned" entry as possibly owned.

use starport_types::{
    ActorRef, ClientId, InteractableState, ObjectId, OwnershipState, ServerMessage, TemplateId,
    Transform, Versioned,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedObject {
    pub template: TemplateId,
    pub transform: Transform,
}

#[derive(Debug, Default)]
pub struct ReplicaView {
    ownership: HashMap<ObjectId, Versioned<OwnershipState>>,
    interactables: HashMap<ObjectId, Versioned<InteractableState>>,
    objects: HashMap<ObjectId, ReplicatedObject>,
    actors: HashMap<ActorRef, ClientId>,
}

impl ReplicaView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a broadcast. Returns true when the view changed.
    pub fn apply(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::OwnershipChanged { object, state } => {
                accept_newer(&mut self.ownership, *object, state)
            }
            ServerMessage::InteractableChanged { gateway, state } => {
                accept_newer(&mut self.interactables, *gateway, state)
            }
            ServerMessage::SpawnNotify {
                object,
                template,
                transform,
            } => {
                self.objects.insert(
                    *object,
                    ReplicatedObject {
                        template: template.clone(),
                        transform: *transform,
                    },
                );
                self.ownership.entry(*object).or_default();
                true
            }
            ServerMessage::Despawned { object } => {
                let known = self.objects.remove(object).is_some();
                let owned = self.ownership.remove(object).is_some();
                let hosted = self.interactables.remove(object).is_some();
                known || owned || hosted
            }
            ServerMessage::ActorAssigned { actor, owner, .. } => {
                self.actors.insert(*actor, *owner) != Some(*owner)
            }
            ServerMessage::ActorRemoved { actor } => self.actors.remove(actor).is_some(),
            _ => false,
        }
    }

    pub fn ownership(&self, object: &ObjectId) -> Option<&Versioned<OwnershipState>> {
        self.ownership.get(object)
    }

    pub fn owner_of(&self, object: &ObjectId) -> Option<ClientId> {
        self.ownership.get(object).and_then(|s| s.value.owner())
    }

    /// Local pre-check before asking for ownership.
    ///
    /// False when the object is unknown, locked against new owners, or owned
    /// by someone else. True is only a hint; the authority node decides.
    pub fn may_request_ownership(&self, object: &ObjectId, me: ClientId) -> bool {
        match self.ownership.get(object) {
            Some(state) if state.value.is_owned_by(me) => true,
            Some(state) => !state.value.has_owner && state.value.grantable,
            None => false,
        }
    }

    pub fn interactable(&self, gateway: &ObjectId) -> Option<&Versioned<InteractableState>> {
        self.interactables.get(gateway)
    }

    pub fn object(&self, object: &ObjectId) -> Option<&ReplicatedObject> {
        self.objects.get(object)
    }

    pub fn actor_owner(&self, actor: &ActorRef) -> Option<ClientId> {
        self.actors.get(actor).copied()
    }

    pub fn actor_of(&self, client: ClientId) -> Option<ActorRef> {
        self.actors
            .iter()
            .find(|(_, owner)| **owner == client)
            .map(|(actor, _)| *actor)
    }
}

fn accept_newer<T: Clone>(map: &mut HashMap<ObjectId, Versioned<T>>, key: ObjectId, incoming: &Versioned<T>) -> bool {
    match map.get(&key) {
        Some(current) if !incoming.is_newer_than(current) => false,
        _ => {
            map.insert(key, incoming.clone());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(object: ObjectId, owner: u64, version: u64) -> ServerMessage {
        ServerMessage::OwnershipChanged {
            object,
            state: Versioned {
                value: OwnershipState::owned_by(ClientId(owner)),
                version,
            },
        }
    }

    #[test]
    fn stale_versions_are_discarded() {
        let mut view = ReplicaView::new();
        let object = ObjectId::new();
        assert!(view.apply(&owned(object, 1, 2)));
        assert!(!view.apply(&owned(object, 2, 1)));
        assert!(!view.apply(&owned(object, 2, 2)));
        assert_eq!(view.owner_of(&object), Some(ClientId(1)));
        assert!(view.apply(&owned(object, 2, 3)));
        assert_eq!(view.owner_of(&object), Some(ClientId(2)));
    }
}
