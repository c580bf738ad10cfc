//! Disconnect reconciliation.
//!
//! When the transport reports a departed client, everything that still names
//! it is cleaned up on the authority node: owned records are force-revoked,
//! its pending gateway entries are dropped (there is nobody left to answer),
//! and its actor is removed from the directory. Running it twice for the same
//! client is a no-op the second time.

use crate::actors::ActorDirectory;
use crate::error::AuthorityResult;
use crate::gateway::InteractionGateway;
use crate::registry::AuthorityRegistry;
use starport_types::{ActorRef, ClientId, ObjectId};
use std::collections::HashMap;
use tracing::info;

/// What one reconciliation cycle cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub client: Option<ClientId>,
    /// Records that were owned by the client and are now unowned.
    pub released: Vec<ObjectId>,
    /// Gateways on which a pending request by the client was dropped.
    pub purged_requests: Vec<ObjectId>,
    pub removed_actor: Option<ActorRef>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.purged_requests.is_empty() && self.removed_actor.is_none()
    }
}

#[derive(Debug, Default)]
pub struct DisconnectReconciler {
    cycles: u64,
}

impl DisconnectReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reconciliation cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn reconcile(
        &mut self,
        client: ClientId,
        registry: &mut AuthorityRegistry,
        gateways: &mut HashMap<ObjectId, InteractionGateway>,
        actors: &mut ActorDirectory,
    ) -> AuthorityResult<ReconcileReport> {
        self.cycles += 1;
        if client.is_server() {
            return Ok(ReconcileReport::default());
        }

        let released = registry.force_revoke_owned_by(client)?;

        let mut purged_requests: Vec<ObjectId> = gateways
            .values_mut()
            .filter_map(|g| g.purge_requester(&client).then(|| g.object()))
            .collect();
        purged_requests.sort();

        let removed_actor = actors.remove_for(&client);

        let report = ReconcileReport {
            client: Some(client),
            released,
            purged_requests,
            removed_actor,
        };
        if !report.is_empty() {
            info!(
                "[RECONCILE] {} disconnected: released {} objects, purged {} requests, actor {:?}",
                client,
                report.released.len(),
                report.purged_requests.len(),
                report.removed_actor.map(|a| a.0),
            );
        }
        Ok(report)
    }
}
