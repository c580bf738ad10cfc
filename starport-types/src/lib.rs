//! Shared types for Starport authority coordination.
//!
//! Everything that crosses the boundary between the authority node and its
//! participants lives here:
//! - Identifiers (`ClientId`, `ObjectId`, `ActorRef`, `TemplateId`, `RequestId`)
//! - Spatial data consumed from the physics collaborator (`Vec3`, `Transform`, `Volume`)
//! - Replicated values (`Versioned<T>`) and the ownership snapshot (`OwnershipState`)
//! - The wire protocol (`ClientMessage`, `ServerMessage`)

mod geometry;
mod ids;
mod ownership;
pub mod protocol;
mod versioned;

pub use geometry::{Transform, Vec3, Volume};
pub use ids::{ActorRef, ClientId, ObjectId, RequestId, TemplateId};
pub use ownership::OwnershipState;
pub use protocol::{
    ClientMessage, InteractableState, MessageKind, ServerMessage, SpawnFailureReason,
};
pub use versioned::Versioned;
