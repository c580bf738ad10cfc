//! Directory of player actors and the clients that own them.
//!
//! The directory is the ground truth the gateway checks identity claims
//! against: an actor reference is honoured only for the client it was
//! assigned to.

use starport_types::{ActorRef, ClientId, ObjectId, Transform};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorEntry {
    pub owner: ClientId,
    pub transform: Transform,
}

#[derive(Debug, Default)]
pub struct ActorDirectory {
    actors: HashMap<ActorRef, ActorEntry>,
    by_client: HashMap<ClientId, ActorRef>,
}

impl ActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a new actor object to `owner`.
    ///
    /// A client has at most one actor; a previous one is removed and returned.
    pub fn assign(&mut self, owner: ClientId, object: ObjectId, transform: Transform) -> (ActorRef, Option<ActorRef>) {
        let replaced = self.remove_for(&owner);
        let actor = ActorRef(object);
        self.actors.insert(actor, ActorEntry { owner, transform });
        self.by_client.insert(owner, actor);
        info!("[AUTHORITY] Assigned {} to {}", actor, owner);
        (actor, replaced)
    }

    /// Removes the actor owned by `client`, if any.
    pub fn remove_for(&mut self, client: &ClientId) -> Option<ActorRef> {
        let actor = self.by_client.remove(client)?;
        self.actors.remove(&actor);
        Some(actor)
    }

    pub fn owner_of(&self, actor: &ActorRef) -> Option<ClientId> {
        self.actors.get(actor).map(|e| e.owner)
    }

    pub fn actor_of(&self, client: &ClientId) -> Option<ActorRef> {
        self.by_client.get(client).copied()
    }

    pub fn get(&self, actor: &ActorRef) -> Option<&ActorEntry> {
        self.actors.get(actor)
    }

    /// All actors, sorted.
    pub fn entries(&self) -> Vec<(ActorRef, ActorEntry)> {
        let mut all: Vec<_> = self.actors.iter().map(|(a, e)| (*a, *e)).collect();
        all.sort_by_key(|(a, _)| *a);
        all
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
