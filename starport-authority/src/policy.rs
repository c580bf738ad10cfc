//! Interaction policies: the pluggable "may this actor use this object" decision.
//!
//! The gateway validates identity and dedups first; a policy only ever sees
//! requests whose actor is known to belong to the requester.
//! `AllowWhenEnabled` is the default and mirrors the interactable flag.

use crate::error::AuthorityResult;
use async_trait::async_trait;
use starport_types::{ActorRef, ClientId, InteractableState, ObjectId, OwnershipState};

/// Everything a policy may look at, captured by the node when the request
/// was accepted.
#[derive(Debug, Clone)]
pub struct InteractionContext {
    pub gateway: ObjectId,
    pub actor: ActorRef,
    pub requester: ClientId,
    pub interactable: InteractableState,
    /// Ownership of the object hosting the gateway, if it has a record.
    pub gateway_ownership: Option<OwnershipState>,
}

/// Decides the outcome of a validated interaction request.
///
/// An `Err` (or a decision that panics or overruns the node's policy timeout)
/// is reported to the requester as a plain failure.
#[async_trait]
pub trait InteractionPolicy: Send + Sync {
    async fn decide(&self, ctx: &InteractionContext) -> AuthorityResult<bool>;
}

/// Allows the interaction while the interactable flag is set.
pub struct AllowWhenEnabled;

#[async_trait]
impl InteractionPolicy for AllowWhenEnabled {
    async fn decide(&self, ctx: &InteractionContext) -> AuthorityResult<bool> {
        Ok(ctx.interactable.allowed)
    }
}

/// Always allows. Ignores the interactable flag.
pub struct AllowAll;

#[async_trait]
impl InteractionPolicy for AllowAll {
    async fn decide(&self, _ctx: &InteractionContext) -> AuthorityResult<bool> {
        Ok(true)
    }
}

/// Always denies.
pub struct DenyAll;

#[async_trait]
impl InteractionPolicy for DenyAll {
    async fn decide(&self, _ctx: &InteractionContext) -> AuthorityResult<bool> {
        Ok(false)
    }
}

/// Allows only while the hosting object is enabled and not held by another client.
pub struct UnheldByOthers;

#[async_trait]
impl InteractionPolicy for UnheldByOthers {
    async fn decide(&self, ctx: &InteractionContext) -> AuthorityResult<bool> {
        if !ctx.interactable.allowed {
            return Ok(false);
        }
        Ok(match ctx.gateway_ownership.and_then(|s| s.owner()) {
            Some(owner) => owner == ctx.requester,
            None => true,
        })
    }
}
