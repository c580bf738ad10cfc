use crate::ids::ClientId;
use serde::{Deserialize, Serialize};

/// Broadcast snapshot of an authority record.
///
/// Constructors keep `has_owner == false ⇒ owner_id == ClientId::SERVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipState {
    pub has_owner: bool,
    pub owner_id: ClientId,
    /// Whether the authority node currently accepts ownership requests.
    pub grantable: bool,
}

impl OwnershipState {
    pub fn unowned() -> Self {
        Self {
            has_owner: false,
            owner_id: ClientId::SERVER,
            grantable: true,
        }
    }

    pub fn owned_by(owner: ClientId) -> Self {
        Self {
            has_owner: true,
            owner_id: owner,
            grantable: true,
        }
    }

    pub fn with_grantable(mut self, grantable: bool) -> Self {
        self.grantable = grantable;
        self
    }

    /// Returns the owner when there is one.
    pub fn owner(&self) -> Option<ClientId> {
        self.has_owner.then_some(self.owner_id)
    }

    pub fn is_owned_by(&self, client: ClientId) -> bool {
        self.has_owner && self.owner_id == client
    }
}

impl Default for OwnershipState {
    fn default() -> Self {
        Self::unowned()
    }
}
