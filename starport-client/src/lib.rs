//! Participant side of Starport authority.
//!
//! A participant never mutates authority state. It asks the authority node
//! through single-flight attempts and keeps a version-gated replica of what
//! the node broadcasts.
//!
//! - [`attempt`]: one outstanding request per local actor, bounded by a timeout
//! - [`replica`]: cached ownership, interactable and object snapshots
//! - [`session`]: the event loop tying both to a [`transport::ClientTransport`]

pub mod attempt;
pub mod config;
pub mod error;
pub mod replica;
pub mod session;
pub mod transport;

pub use attempt::{AttemptCallback, AttemptCoordinator, AttemptFailure, AttemptKind, AttemptOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use replica::{ReplicaView, ReplicatedObject};
pub use session::{create_client_session, ClientCommand, ClientEvent, ClientHandle, ClientSession};
pub use transport::ClientTransport;
