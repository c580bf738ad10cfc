//! Starport authority node.
//!
//! One participant, the authority node, is the single writer of who owns
//! which shared object. Everyone else sends requests and applies the
//! versioned snapshots the node broadcasts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── AuthorityNode::run ────────────────────────────┐
//! │  AuthorityRegistry   InteractionGateway ×N   SpawnCoordinator   Actors     │
//! │        │                    │                      │                       │
//! │        └── publications ────┴──── Outbound ────────┘                       │
//! └───────────────▲──────────────────────────────────────────────┬─────────────┘
//!                 │ TransportEvent                               │ send / broadcast
//!          NodeTransport ◀───────────────────────────────────────┘
//! ```
//!
//! The state machines in this crate do no I/O. [`node::AuthorityNode`] owns
//! them, routes messages by kind, runs interaction policies off-loop and
//! hands the resulting messages to a [`transport::NodeTransport`].

pub mod actors;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gateway;
pub mod node;
pub mod policy;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod spawn;
pub mod transport;

pub use actors::{ActorDirectory, ActorEntry};
pub use config::{AuthorityConfig, TemplateConfig};
pub use devices::{DeviceBinding, Dispenser, Disposer};
pub use dispatch::{Outbound, ValidatedSender};
pub use error::{AuthorityError, AuthorityResult};
pub use events::AuthorityEvent;
pub use gateway::{
    Admission, Completion, DecisionOutcome, InteractionGateway, PendingDecision, PendingEntry,
    PendingRequestSet, RejectReason,
};
pub use node::{
    create_authority_node, create_authority_node_with_factory, AuthorityNode, GatewaySetup,
    NodeCommand, NodeHandle,
};
pub use policy::{AllowAll, AllowWhenEnabled, DenyAll, InteractionContext, InteractionPolicy, UnheldByOthers};
pub use reconciler::{DisconnectReconciler, ReconcileReport};
pub use record::AuthorityRecord;
pub use registry::{
    AuthorityRegistry, ChangeCause, DenyReason, NodeRole, OwnershipChange, OwnershipDecision,
    RevokeOutcome,
};
pub use spawn::{LocalObjectFactory, ObjectFactory, SpawnCoordinator, SpawnFailure, Spawned};
pub use transport::{NodeTransport, TransportEvent};
