//! Authority registry: the only writer of ownership state.
//!
//! The registry is a plain state machine owned by the node loop. It never
//! performs I/O: each transition is appended to a publication queue that the
//! node drains and broadcasts after handling the message that caused it.

use crate::error::{AuthorityError, AuthorityResult};
use crate::record::AuthorityRecord;
use starport_types::{ClientId, ObjectId, OwnershipState, Versioned};
use std::collections::HashMap;
use tracing::{debug, info};

/// Whether this participant may mutate authority state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// The single authority node. Applies mutations.
    Authority,
    /// Any other participant. Mutations are refused and must be forwarded.
    Replica,
}

/// Outcome of an ownership request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipDecision {
    Granted,
    Denied(DenyReason),
}

impl OwnershipDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, OwnershipDecision::Granted)
    }
}

/// Why an ownership request was denied. Logged only; callers see `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Another client owns the object.
    Contended,
    /// The node has locked the object against new owners.
    NotGrantable,
    /// The sentinel server identity never owns objects.
    ReservedIdentity,
}

/// Outcome of a voluntary revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    Ignored,
}

/// What caused an ownership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Granted(ClientId),
    Revoked(ClientId),
    ForceRevoked,
    GrantableChanged,
    Removed,
}

/// A transition waiting to be broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipChange {
    pub object: ObjectId,
    pub state: Versioned<OwnershipState>,
    pub cause: ChangeCause,
}

/// Holds one `AuthorityRecord` per shared object.
pub struct AuthorityRegistry {
    role: NodeRole,
    records: HashMap<ObjectId, AuthorityRecord>,
    publications: Vec<OwnershipChange>,
}

impl AuthorityRegistry {
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            records: HashMap::new(),
            publications: Vec::new(),
        }
    }

    /// Registry for the authority node.
    pub fn authority() -> Self {
        Self::new(NodeRole::Authority)
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    fn ensure_authority(&self) -> AuthorityResult<()> {
        match self.role {
            NodeRole::Authority => Ok(()),
            NodeRole::Replica => Err(AuthorityError::NotAuthorityNode),
        }
    }

    fn record_mut(&mut self, object: &ObjectId) -> AuthorityResult<&mut AuthorityRecord> {
        self.records
            .get_mut(object)
            .ok_or(AuthorityError::UnknownObject(*object))
    }

    fn publish(&mut self, object: ObjectId, state: Versioned<OwnershipState>, cause: ChangeCause) {
        debug!("[AUTHORITY] {} -> {:?} (v{}, {:?})", object, state.value.owner(), state.version, cause);
        self.publications.push(OwnershipChange { object, state, cause });
    }

    /// Attaches a fresh, unowned record to a new object.
    pub fn register(&mut self, object: ObjectId) -> AuthorityResult<()> {
        self.ensure_authority()?;
        if self.records.contains_key(&object) {
            return Err(AuthorityError::AlreadyRegistered(object));
        }
        self.records.insert(object, AuthorityRecord::new());
        Ok(())
    }

    /// Destroys the record for `object`, resetting ownership first.
    ///
    /// Returns the owner the object had at destruction time.
    pub fn remove(&mut self, object: &ObjectId) -> AuthorityResult<Option<ClientId>> {
        self.ensure_authority()?;
        let mut record = self
            .records
            .remove(object)
            .ok_or(AuthorityError::UnknownObject(*object))?;
        let previous = record.owner();
        if record.clear() {
            self.publish(*object, record.snapshot(), ChangeCause::Removed);
        }
        Ok(previous)
    }

    /// Grants ownership when the object is free or already owned by `requester`.
    pub fn request_ownership(
        &mut self,
        object: &ObjectId,
        requester: ClientId,
    ) -> AuthorityResult<OwnershipDecision> {
        self.ensure_authority()?;
        if requester.is_server() {
            return Ok(OwnershipDecision::Denied(DenyReason::ReservedIdentity));
        }
        let record = self.record_mut(object)?;

        if record.is_owned_by(requester) {
            // Re-request by the owner: granted, nothing to publish.
            return Ok(OwnershipDecision::Granted);
        }
        if record.has_owner() {
            debug!("[AUTHORITY] {} denied {}: owned by {:?}", requester, object, record.owner());
            return Ok(OwnershipDecision::Denied(DenyReason::Contended));
        }
        if !record.is_grantable() {
            return Ok(OwnershipDecision::Denied(DenyReason::NotGrantable));
        }

        record.set_owner(requester);
        let state = record.snapshot();
        info!("[AUTHORITY] {} granted to {}", object, requester);
        self.publish(*object, state, ChangeCause::Granted(requester));
        Ok(OwnershipDecision::Granted)
    }

    /// Releases ownership, but only on behalf of the current owner.
    pub fn revoke_ownership(
        &mut self,
        object: &ObjectId,
        requester: ClientId,
    ) -> AuthorityResult<RevokeOutcome> {
        self.ensure_authority()?;
        let record = self.record_mut(object)?;
        if !record.is_owned_by(requester) {
            debug!("[AUTHORITY] Ignoring revoke of {} by non-owner {}", object, requester);
            return Ok(RevokeOutcome::Ignored);
        }
        record.clear();
        let state = record.snapshot();
        info!("[AUTHORITY] {} released by {}", object, requester);
        self.publish(*object, state, ChangeCause::Revoked(requester));
        Ok(RevokeOutcome::Revoked)
    }

    /// Resets `object` to unowned regardless of who owns it.
    ///
    /// Returns true when an owner was actually removed.
    pub fn force_revoke(&mut self, object: &ObjectId) -> AuthorityResult<bool> {
        self.ensure_authority()?;
        let record = self.record_mut(object)?;
        if !record.clear() {
            return Ok(false);
        }
        let state = record.snapshot();
        self.publish(*object, state, ChangeCause::ForceRevoked);
        Ok(true)
    }

    /// Force-revokes every object owned by `client`. Returns the released objects.
    pub fn force_revoke_owned_by(&mut self, client: ClientId) -> AuthorityResult<Vec<ObjectId>> {
        self.ensure_authority()?;
        let owned = self.owned_by(client);
        for object in &owned {
            self.force_revoke(object)?;
        }
        Ok(owned)
    }

    /// Locks or unlocks `object` against new owners. The current owner keeps it.
    pub fn set_grantable(&mut self, object: &ObjectId, grantable: bool) -> AuthorityResult<()> {
        self.ensure_authority()?;
        let record = self.record_mut(object)?;
        if record.set_grantable(grantable) {
            let state = record.snapshot();
            self.publish(*object, state, ChangeCause::GrantableChanged);
        }
        Ok(())
    }

    pub fn snapshot(&self, object: &ObjectId) -> Option<Versioned<OwnershipState>> {
        self.records.get(object).map(AuthorityRecord::snapshot)
    }

    /// Every record's current state, sorted by object.
    pub fn snapshots(&self) -> Vec<(ObjectId, Versioned<OwnershipState>)> {
        let mut all: Vec<_> = self.records.iter().map(|(id, r)| (*id, r.snapshot())).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn owner_of(&self, object: &ObjectId) -> Option<ClientId> {
        self.records.get(object).and_then(AuthorityRecord::owner)
    }

    /// Objects currently owned by `client`, in a stable order.
    pub fn owned_by(&self, client: ClientId) -> Vec<ObjectId> {
        let mut owned: Vec<ObjectId> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_owned_by(client))
            .map(|(id, _)| *id)
            .collect();
        owned.sort();
        owned
    }

    pub fn contains(&self, object: &ObjectId) -> bool {
        self.records.contains_key(object)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drains transitions recorded since the last call, in order.
    pub fn take_publications(&mut self) -> Vec<OwnershipChange> {
        std::mem::take(&mut self.publications)
    }
}

impl std::fmt::Debug for AuthorityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityRegistry")
            .field("role", &self.role)
            .field("records", &self.records.len())
            .field("unpublished", &self.publications.len())
            .finish()
    }
}
