//! Client session: the participant's event loop.
//!
//! The session owns the replica view and the attempt coordinator for the
//! local actor. Game code talks to it through a `ClientHandle`; replies and
//! broadcasts from the authority node arrive through the transport. The only
//! timer is the pending attempt's deadline.

use crate::attempt::{AttemptCallback, AttemptCoordinator, AttemptFailure, AttemptKind, AttemptOutcome};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::replica::ReplicaView;
use crate::transport::ClientTransport;
use starport_types::{
    ActorRef, ClientId, ClientMessage, ObjectId, OwnershipState, RequestId, ServerMessage, Vec3,
    Versioned,
};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Commands from game code to the session loop.
pub enum ClientCommand {
    Interact {
        gateway: ObjectId,
        callback: AttemptCallback,
    },
    PickUp {
        object: ObjectId,
        callback: AttemptCallback,
    },
    /// Fire-and-forget release of an owned object (drop or throw).
    Release {
        object: ObjectId,
    },
    ReportPosition {
        object: ObjectId,
        position: Vec3,
    },
    OwnershipOf {
        object: ObjectId,
        reply: oneshot::Sender<Option<Versioned<OwnershipState>>>,
    },
    Shutdown,
}

/// Events for game code.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The authority node assigned this client its actor.
    ActorReady(ActorRef),
    /// A broadcast that changed the replica view.
    Applied(ServerMessage),
    /// The authority node rejected a disposal request while another was running.
    DisposalRejected { disposer: ObjectId },
}

#[derive(Clone)]
pub struct ClientHandle {
    command_tx: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub async fn send(&self, command: ClientCommand) -> ClientResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub async fn start_interact(&self, gateway: ObjectId, callback: AttemptCallback) -> ClientResult<()> {
        self.send(ClientCommand::Interact { gateway, callback }).await
    }

    pub async fn start_pick_up(&self, object: ObjectId, callback: AttemptCallback) -> ClientResult<()> {
        self.send(ClientCommand::PickUp { object, callback }).await
    }

    /// Uses `gateway` and waits for the outcome.
    pub async fn interact(&self, gateway: ObjectId) -> ClientResult<AttemptOutcome> {
        let (tx, rx) = oneshot::channel();
        self.start_interact(gateway, Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }))
        .await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Asks for ownership of `object` and waits for the outcome.
    pub async fn pick_up(&self, object: ObjectId) -> ClientResult<AttemptOutcome> {
        let (tx, rx) = oneshot::channel();
        self.start_pick_up(object, Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }))
        .await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    pub async fn release(&self, object: ObjectId) -> ClientResult<()> {
        self.send(ClientCommand::Release { object }).await
    }

    pub async fn report_position(&self, object: ObjectId, position: Vec3) -> ClientResult<()> {
        self.send(ClientCommand::ReportPosition { object, position }).await
    }

    pub async fn ownership_of(&self, object: ObjectId) -> ClientResult<Option<Versioned<OwnershipState>>> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::OwnershipOf { object, reply }).await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> ClientResult<()> {
        self.send(ClientCommand::Shutdown).await
    }
}

pub struct ClientSession {
    id: ClientId,
    view: ReplicaView,
    actor: Option<ActorRef>,
    attempts: AttemptCoordinator,
    next_request: u64,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl ClientSession {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Runs until shutdown, the command channel closing, or the transport closing.
    ///
    /// A pending attempt is cancelled on exit.
    pub async fn run(
        mut self,
        transport: Arc<dyn ClientTransport>,
        mut command_rx: mpsc::Receiver<ClientCommand>,
    ) -> ClientResult<()> {
        info!("[SESSION] {} started", self.id);

        loop {
            let deadline = self.attempts.next_deadline();
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => {
                        info!("[SESSION] {} shutting down", self.id);
                        break;
                    }
                    Some(command) => self.handle_command(transport.as_ref(), command).await,
                },

                message = transport.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        info!("[SESSION] {} disconnected", self.id);
                        break;
                    }
                },

                _ = sleep_until_due(deadline), if deadline.is_some() => {
                    self.attempts.expire(Instant::now());
                }
            }
        }

        self.attempts.cancel();
        Ok(())
    }

    async fn handle_command(&mut self, transport: &dyn ClientTransport, command: ClientCommand) {
        match command {
            ClientCommand::Interact { gateway, callback } => {
                self.begin(transport, AttemptKind::Interact { gateway }, callback).await;
            }
            ClientCommand::PickUp { object, callback } => {
                if !self.view.may_request_ownership(&object, self.id) {
                    debug!("[SESSION] {} looks unavailable, not asking", object);
                    callback(AttemptOutcome::Failed(AttemptFailure::Unavailable));
                    return;
                }
                self.begin(transport, AttemptKind::Pickup { object }, callback).await;
            }
            ClientCommand::Release { object } => {
                let message = ClientMessage::RevokeOwnership {
                    object,
                    requester: self.id,
                };
                if let Err(e) = transport.send(message).await {
                    warn!("[SESSION] Release of {} not sent: {}", object, e);
                }
            }
            ClientCommand::ReportPosition { object, position } => {
                if let Err(e) = transport.send(ClientMessage::ReportPosition { object, position }).await {
                    warn!("[SESSION] Position of {} not sent: {}", object, e);
                }
            }
            ClientCommand::OwnershipOf { object, reply } => {
                let _ = reply.send(self.view.ownership(&object).copied());
            }
            ClientCommand::Shutdown => {}
        }
    }

    async fn begin(&mut self, transport: &dyn ClientTransport, kind: AttemptKind, callback: AttemptCallback) {
        let Some(actor) = self.actor else {
            callback(AttemptOutcome::Failed(AttemptFailure::NoActor));
            return;
        };

        let request_id = RequestId(self.next_request);
        if self.attempts.start(kind, request_id, Instant::now(), callback).is_err() {
            return;
        }
        self.next_request += 1;

        let message = match kind {
            AttemptKind::Interact { gateway } => ClientMessage::RequestInteract {
                gateway,
                actor,
                sender: self.id,
                request_id,
            },
            AttemptKind::Pickup { object } => ClientMessage::RequestOwnership {
                object,
                requester: self.id,
                request_id,
            },
        };
        if let Err(e) = transport.send(message).await {
            warn!("[SESSION] {:?} not sent: {}", kind, e);
            self.attempts.fail(request_id, AttemptFailure::Disconnected);
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::OwnershipResult {
                object,
                request_id,
                granted,
            } => {
                self.attempts.resolve(object, request_id, granted);
            }
            ServerMessage::InteractResult {
                gateway,
                request_id,
                success,
            } => {
                self.attempts.resolve(gateway, request_id, success);
            }
            ServerMessage::DisposalRejected { disposer } => {
                self.emit(ClientEvent::DisposalRejected { disposer });
            }
            message => {
                let ours = match &message {
                    ServerMessage::ActorAssigned { actor, owner, .. } if *owner == self.id => Some(*actor),
                    _ => None,
                };
                if let ServerMessage::ActorRemoved { actor } = &message {
                    if self.actor == Some(*actor) {
                        info!("[SESSION] {} lost its actor", self.id);
                        self.actor = None;
                    }
                }
                if self.view.apply(&message) {
                    self.emit(ClientEvent::Applied(message));
                }
                if let Some(actor) = ours {
                    info!("[SESSION] {} controls {}", self.id, actor);
                    self.actor = Some(actor);
                    self.emit(ClientEvent::ActorReady(actor));
                }
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            warn!("[SESSION] Event channel full, dropping {:?}", event);
        }
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Creates a session for the transport-assigned identity `id`.
///
/// Returns the handle, the event receiver, the command receiver to pass to
/// [`ClientSession::run`], and the session itself.
pub fn create_client_session(
    id: ClientId,
    config: ClientConfig,
) -> ClientResult<(ClientHandle, mpsc::Receiver<ClientEvent>, mpsc::Receiver<ClientCommand>, ClientSession)> {
    config.validate()?;
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let session = ClientSession {
        id,
        view: ReplicaView::new(),
        actor: None,
        attempts: AttemptCoordinator::new(config.attempt_timeout()),
        next_request: 0,
        event_tx,
    };
    Ok((ClientHandle { command_tx }, event_rx, command_rx, session))
}
