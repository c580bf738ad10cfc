//! Per-object ownership state.

use starport_types::{ClientId, OwnershipState, Versioned};

/// Ownership record for one shared object.
///
/// Only the registry mutates a record, and every mutation bumps the version
/// so that readers can discard stale broadcasts.
#[derive(Debug, Clone)]
pub struct AuthorityRecord {
    state: Versioned<OwnershipState>,
}

impl AuthorityRecord {
    pub fn new() -> Self {
        Self {
            state: Versioned::new(OwnershipState::unowned()),
        }
    }

    pub fn snapshot(&self) -> Versioned<OwnershipState> {
        self.state
    }

    pub fn has_owner(&self) -> bool {
        self.state.value.has_owner
    }

    pub fn owner(&self) -> Option<ClientId> {
        self.state.value.owner()
    }

    pub fn is_owned_by(&self, client: ClientId) -> bool {
        self.state.value.is_owned_by(client)
    }

    pub fn is_grantable(&self) -> bool {
        self.state.value.grantable
    }

    pub(crate) fn set_owner(&mut self, owner: ClientId) {
        let grantable = self.state.value.grantable;
        self.state
            .bump(OwnershipState::owned_by(owner).with_grantable(grantable));
    }

    /// Returns false when the record already had no owner.
    pub(crate) fn clear(&mut self) -> bool {
        if !self.has_owner() {
            return false;
        }
        let grantable = self.state.value.grantable;
        self.state
            .bump(OwnershipState::unowned().with_grantable(grantable));
        true
    }

    /// Returns false when the flag already had this value.
    pub(crate) fn set_grantable(&mut self, grantable: bool) -> bool {
        if self.state.value.grantable == grantable {
            return false;
        }
        let next = self.state.value.with_grantable(grantable);
        self.state.bump(next);
        true
    }
}

impl Default for AuthorityRecord {
    fn default() -> Self {
        Self::new()
    }
}
