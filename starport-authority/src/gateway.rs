//! Interaction gateway: request/response layer for "use object X".
//!
//! A request passes through three gates before any policy runs:
//! 1. the identity claimed in the message must equal the transport sender,
//! 2. the claimed actor must exist and be owned by that sender,
//! 3. the sender must not already have a request pending on this gateway.
//!
//! Failing gate 1 or 2 is a spoof attempt. It is logged under the `security`
//! target but answered with the same plain failure a denied request gets.

use crate::actors::ActorDirectory;
use crate::error::AuthorityError;
use crate::policy::{InteractionContext, InteractionPolicy};
use starport_types::{ActorRef, ClientId, InteractableState, ObjectId, OwnershipState, RequestId, Versioned};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A request accepted by a gateway and waiting for its policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntry {
    pub request_id: RequestId,
    pub actor: ActorRef,
    /// Distinguishes this acceptance from earlier ones by the same requester.
    pub ticket: u64,
}

/// Requesters awaiting a reply from one gateway. At most one entry per requester.
#[derive(Debug, Default)]
pub struct PendingRequestSet {
    entries: HashMap<ClientId, PendingEntry>,
}

impl PendingRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the set unchanged, if `requester` already has an entry.
    pub fn insert(&mut self, requester: ClientId, entry: PendingEntry) -> bool {
        if self.entries.contains_key(&requester) {
            return false;
        }
        self.entries.insert(requester, entry);
        true
    }

    pub fn contains(&self, requester: &ClientId) -> bool {
        self.entries.contains_key(requester)
    }

    pub fn remove(&mut self, requester: &ClientId) -> Option<PendingEntry> {
        self.entries.remove(requester)
    }

    /// Removes the entry only if it is the acceptance identified by `ticket`.
    pub fn take_ticket(&mut self, requester: &ClientId, ticket: u64) -> Option<PendingEntry> {
        match self.entries.get(requester) {
            Some(entry) if entry.ticket == ticket => self.entries.remove(requester),
            _ => None,
        }
    }

    /// Removes all entries, sorted by requester.
    pub fn drain(&mut self) -> Vec<(ClientId, PendingEntry)> {
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_by_key(|(client, _)| *client);
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a request never reached the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Claimed identity or actor ownership does not match the sender.
    Spoofed,
    /// The actor reference does not resolve to a live actor.
    UnknownActor,
    /// The sender already has a request pending here.
    Duplicate,
}

/// Result of presenting a request to a gateway.
pub enum Admission {
    /// Answer `Denied` to `reply_to` right away.
    Rejected {
        reply_to: ClientId,
        request_id: RequestId,
        reason: RejectReason,
    },
    /// The request holds a pending entry; run the decision and complete it.
    Admitted(PendingDecision),
}

/// A validated request whose policy decision has not run yet.
pub struct PendingDecision {
    pub gateway: ObjectId,
    pub requester: ClientId,
    pub ticket: u64,
    pub context: InteractionContext,
    policy: Arc<dyn InteractionPolicy>,
}

/// Outcome of running a `PendingDecision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub gateway: ObjectId,
    pub requester: ClientId,
    pub ticket: u64,
    pub allowed: bool,
}

impl PendingDecision {
    /// Runs the policy on its own task, bounded by `timeout`.
    ///
    /// Policy errors, panics and timeouts all resolve to `allowed = false`.
    pub async fn evaluate(self, timeout: Duration) -> DecisionOutcome {
        let PendingDecision {
            gateway,
            requester,
            ticket,
            context,
            policy,
        } = self;

        let mut task = tokio::spawn(async move { policy.decide(&context).await });
        let allowed = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(allowed))) => allowed,
            Ok(Ok(Err(e))) => {
                warn!("[GATEWAY] Policy for {} failed for {}: {}", gateway, requester, e);
                false
            }
            Ok(Err(e)) => {
                warn!("[GATEWAY] Policy task for {} aborted: {}", gateway, e);
                false
            }
            Err(_) => {
                task.abort();
                let e = AuthorityError::Policy(format!("no decision within {timeout:?}"));
                warn!("[GATEWAY] Policy for {} unavailable: {}", gateway, e);
                false
            }
        };

        DecisionOutcome {
            gateway,
            requester,
            ticket,
            allowed,
        }
    }
}

/// A finished request: the reply to send and the side effect to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub requester: ClientId,
    pub request_id: RequestId,
    pub actor: ActorRef,
    pub success: bool,
}

/// Gateway hosted by one object.
pub struct InteractionGateway {
    object: ObjectId,
    interactable: Versioned<InteractableState>,
    pending: PendingRequestSet,
    policy: Arc<dyn InteractionPolicy>,
    next_ticket: u64,
}

impl InteractionGateway {
    pub fn new(object: ObjectId, policy: Arc<dyn InteractionPolicy>) -> Self {
        Self {
            object,
            interactable: Versioned::new(InteractableState::default()),
            pending: PendingRequestSet::new(),
            policy,
            next_ticket: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.interactable.value.description = description.into();
        self
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn interactable(&self) -> &Versioned<InteractableState> {
        &self.interactable
    }

    pub fn is_allowed(&self) -> bool {
        self.interactable.value.allowed
    }

    pub fn pending(&self) -> &PendingRequestSet {
        &self.pending
    }

    /// Validates and dedups a request; on success the requester holds a pending entry.
    pub fn accept(
        &mut self,
        sender: ClientId,
        claimed: ClientId,
        actor: ActorRef,
        request_id: RequestId,
        actors: &ActorDirectory,
        gateway_ownership: Option<OwnershipState>,
    ) -> Admission {
        debug!("[GATEWAY] {} received interact request from {}", self.object, sender);

        let reject = |reason| Admission::Rejected {
            reply_to: sender,
            request_id,
            reason,
        };

        if claimed != sender {
            warn!(
                target: "security",
                "[GATEWAY] {} spoof: sender {} claimed identity {}", self.object, sender, claimed
            );
            return reject(RejectReason::Spoofed);
        }

        let actor_owner = match actors.owner_of(&actor) {
            Some(owner) => owner,
            None => {
                warn!("[GATEWAY] {} request from {} names unknown {}", self.object, sender, actor);
                return reject(RejectReason::UnknownActor);
            }
        };

        if actor_owner != sender {
            warn!(
                target: "security",
                "[GATEWAY] {} spoof: sender {} claimed {} owned by {}",
                self.object, sender, actor, actor_owner
            );
            return reject(RejectReason::Spoofed);
        }

        let ticket = self.next_ticket;
        let entry = PendingEntry {
            request_id,
            actor,
            ticket,
        };
        if !self.pending.insert(sender, entry) {
            warn!("[GATEWAY] {} client {} already has a pending request", self.object, sender);
            return reject(RejectReason::Duplicate);
        }
        self.next_ticket += 1;

        Admission::Admitted(PendingDecision {
            gateway: self.object,
            requester: sender,
            ticket,
            context: InteractionContext {
                gateway: self.object,
                actor,
                requester: sender,
                interactable: self.interactable.value.clone(),
                gateway_ownership,
            },
            policy: self.policy.clone(),
        })
    }

    /// Clears the pending entry for a finished decision.
    ///
    /// Returns `None` when the entry is gone (requester disconnected or the
    /// gateway was torn down and rebuilt); the decision is then discarded.
    pub fn complete(&mut self, outcome: &DecisionOutcome) -> Option<Completion> {
        let entry = self.pending.take_ticket(&outcome.requester, outcome.ticket)?;
        info!(
            "[GATEWAY] {} sending {} result to {}",
            self.object, outcome.allowed, outcome.requester
        );
        Some(Completion {
            requester: outcome.requester,
            request_id: entry.request_id,
            actor: entry.actor,
            success: outcome.allowed,
        })
    }

    /// Drops the pending entry of a departed requester without replying.
    pub fn purge_requester(&mut self, requester: &ClientId) -> bool {
        self.pending.remove(requester).is_some()
    }

    /// Fails every pending request. Returns the failures to unicast.
    pub fn teardown(&mut self) -> Vec<(ClientId, RequestId)> {
        let failed: Vec<_> = self
            .pending
            .drain()
            .into_iter()
            .map(|(client, entry)| (client, entry.request_id))
            .collect();
        if !failed.is_empty() {
            info!("[GATEWAY] {} torn down with {} pending requests", self.object, failed.len());
        }
        failed
    }

    /// Returns the new state when the flag actually changed.
    pub fn set_allowed(&mut self, allowed: bool) -> Option<Versioned<InteractableState>> {
        if self.interactable.value.allowed == allowed {
            return None;
        }
        let mut next = self.interactable.value.clone();
        next.allowed = allowed;
        self.interactable.bump(next);
        Some(self.interactable.clone())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Option<Versioned<InteractableState>> {
        let description = description.into();
        if self.interactable.value.description == description {
            return None;
        }
        let mut next = self.interactable.value.clone();
        next.description = description;
        self.interactable.bump(next);
        Some(self.interactable.clone())
    }
}

impl std::fmt::Debug for InteractionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionGateway")
            .field("object", &self.object)
            .field("allowed", &self.interactable.value.allowed)
            .field("pending", &self.pending.len())
            .finish()
    }
}
