use async_trait::async_trait;
use pretty_assertions::assert_eq;
use starport_client::{
    create_client_session, AttemptCallback, AttemptFailure, AttemptOutcome, ClientConfig,
    ClientError, ClientEvent, ClientHandle, ClientResult, ClientTransport,
};
use starport_types::{
    ActorRef, ClientId, ClientMessage, ObjectId, OwnershipState, RequestId, ServerMessage,
    TemplateId, Transform, Vec3, Versioned,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const ME: ClientId = ClientId(7);
const OTHER: ClientId = ClientId(8);

// ── Mock Transport ──────────────────────────────────────────────

struct MockTransport {
    incoming: Mutex<mpsc::Receiver<ServerMessage>>,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

#[async_trait]
impl ClientTransport for MockTransport {
    async fn recv(&self) -> Option<ServerMessage> {
        self.incoming.lock().await.recv().await
    }

    async fn send(&self, message: ClientMessage) -> ClientResult<()> {
        self.outgoing
            .send(message)
            .map_err(|_| ClientError::Transport("link down".into()))
    }
}

// ── Harness ─────────────────────────────────────────────────────

struct Harness {
    handle: ClientHandle,
    events: mpsc::Receiver<ClientEvent>,
    inbound: mpsc::Sender<ServerMessage>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    task: JoinHandle<ClientResult<()>>,
}

fn start() -> Harness {
    let (handle, events, command_rx, session) =
        create_client_session(ME, ClientConfig::default()).unwrap();
    let (inbound, incoming) = mpsc::channel(64);
    let (outgoing, outbound) = mpsc::unbounded_channel();
    let transport = Arc::new(MockTransport {
        incoming: Mutex::new(incoming),
        outgoing,
    });
    let task = tokio::spawn(session.run(transport, command_rx));
    Harness {
        handle,
        events,
        inbound,
        outbound,
        task,
    }
}

fn outcome_channel() -> (AttemptCallback, oneshot::Receiver<AttemptOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: AttemptCallback = Box::new(move |outcome| {
        let _ = tx.send(outcome);
    });
    (callback, rx)
}

fn ownership(object: ObjectId, value: OwnershipState, version: u64) -> ServerMessage {
    ServerMessage::OwnershipChanged {
        object,
        state: Versioned { value, version },
    }
}

impl Harness {
    async fn push(&self, message: ServerMessage) {
        self.inbound.send(message).await.unwrap();
    }

    async fn next_event(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn next_sent(&mut self) -> ClientMessage {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("timed out waiting for session output")
            .expect("session output closed")
    }

    async fn assign_actor(&mut self) -> ActorRef {
        let actor = ActorRef(ObjectId::new());
        self.push(ServerMessage::ActorAssigned {
            actor,
            owner: ME,
            transform: Transform::default(),
        })
        .await;
        self.next_event(|e| matches!(e, ClientEvent::ActorReady(_))).await;
        actor
    }

    /// Makes `object` known to the view, unowned.
    async fn spawn(&mut self, object: ObjectId) {
        self.push(ServerMessage::SpawnNotify {
            object,
            template: TemplateId::new("crate"),
            transform: Transform::at(Vec3::new(0.0, 1.0, 0.0)),
        })
        .await;
        self.next_event(|e| matches!(e, ClientEvent::Applied(ServerMessage::SpawnNotify { .. })))
            .await;
    }

    async fn sent_interact(&mut self) -> RequestId {
        match self.next_sent().await {
            ClientMessage::RequestInteract { request_id, .. } => request_id,
            other => panic!("unexpected {other:?}"),
        }
    }
}

// ── Actor ───────────────────────────────────────────────────────

#[tokio::test]
async fn interact_without_actor_fails_without_sending() {
    let mut h = start();
    let outcome = h.handle.interact(ObjectId::new()).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::NoActor));
    assert!(h.outbound.try_recv().is_err());
}

#[tokio::test]
async fn removed_actor_makes_attempts_fail() {
    let mut h = start();
    let actor = h.assign_actor().await;
    h.push(ServerMessage::ActorRemoved { actor }).await;
    h.next_event(|e| matches!(e, ClientEvent::Applied(ServerMessage::ActorRemoved { .. })))
        .await;

    let outcome = h.handle.interact(ObjectId::new()).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::NoActor));
}

#[tokio::test]
async fn actor_of_another_client_is_not_ours() {
    let mut h = start();
    h.push(ServerMessage::ActorAssigned {
        actor: ActorRef(ObjectId::new()),
        owner: OTHER,
        transform: Transform::default(),
    })
    .await;
    h.next_event(|e| matches!(e, ClientEvent::Applied(_))).await;

    let outcome = h.handle.interact(ObjectId::new()).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::NoActor));
}

// ── Interact ────────────────────────────────────────────────────

#[tokio::test]
async fn interact_sends_claim_and_resolves_on_result() {
    let mut h = start();
    let actor = h.assign_actor().await;
    let gateway = ObjectId::new();

    let (callback, rx) = outcome_channel();
    h.handle.start_interact(gateway, callback).await.unwrap();

    let request_id = match h.next_sent().await {
        ClientMessage::RequestInteract {
            gateway: g,
            actor: a,
            sender,
            request_id,
        } => {
            assert_eq!((g, a, sender), (gateway, actor, ME));
            request_id
        }
        other => panic!("unexpected {other:?}"),
    };

    h.push(ServerMessage::InteractResult {
        gateway,
        request_id,
        success: true,
    })
    .await;
    assert_eq!(rx.await.unwrap(), AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn second_attempt_while_pending_is_busy() {
    let mut h = start();
    h.assign_actor().await;
    let gateway = ObjectId::new();

    let (callback, first) = outcome_channel();
    h.handle.start_interact(gateway, callback).await.unwrap();
    let request_id = h.sent_interact().await;

    let second = h.handle.interact(ObjectId::new()).await.unwrap();
    assert_eq!(second, AttemptOutcome::Failed(AttemptFailure::Busy));

    h.push(ServerMessage::InteractResult {
        gateway,
        request_id,
        success: false,
    })
    .await;
    assert_eq!(first.await.unwrap(), AttemptOutcome::Failed(AttemptFailure::Denied));
    assert!(h.outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn unanswered_attempt_times_out_and_late_reply_is_ignored() {
    let mut h = start();
    h.assign_actor().await;
    let gateway = ObjectId::new();

    let started = Instant::now();
    let (callback, rx) = outcome_channel();
    h.handle.start_interact(gateway, callback).await.unwrap();
    let stale = h.sent_interact().await;

    assert_eq!(rx.await.unwrap(), AttemptOutcome::Failed(AttemptFailure::TimedOut));
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    h.push(ServerMessage::InteractResult {
        gateway,
        request_id: stale,
        success: true,
    })
    .await;

    let (callback, rx) = outcome_channel();
    h.handle.start_interact(gateway, callback).await.unwrap();
    let fresh = h.sent_interact().await;
    assert_ne!(fresh, stale);

    h.push(ServerMessage::InteractResult {
        gateway,
        request_id: fresh,
        success: false,
    })
    .await;
    assert_eq!(rx.await.unwrap(), AttemptOutcome::Failed(AttemptFailure::Denied));
}

#[tokio::test]
async fn send_failure_fails_the_attempt() {
    let mut h = start();
    h.assign_actor().await;
    drop(h.outbound);

    let outcome = h.handle.interact(ObjectId::new()).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::Disconnected));
}

// ── Pickup ──────────────────────────────────────────────────────

#[tokio::test]
async fn pick_up_of_unknown_object_is_unavailable() {
    let mut h = start();
    h.assign_actor().await;

    let outcome = h.handle.pick_up(ObjectId::new()).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::Unavailable));
    assert!(h.outbound.try_recv().is_err());
}

#[tokio::test]
async fn pick_up_waits_for_the_object_to_be_free() {
    let mut h = start();
    h.assign_actor().await;
    let object = ObjectId::new();
    h.spawn(object).await;
    h.push(ownership(object, OwnershipState::owned_by(OTHER), 1)).await;
    h.next_event(|e| matches!(e, ClientEvent::Applied(ServerMessage::OwnershipChanged { .. })))
        .await;

    let outcome = h.handle.pick_up(object).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Failed(AttemptFailure::Unavailable));

    h.push(ownership(object, OwnershipState::unowned(), 2)).await;
    h.next_event(|e| matches!(e, ClientEvent::Applied(ServerMessage::OwnershipChanged { .. })))
        .await;

    let (callback, rx) = outcome_channel();
    h.handle.start_pick_up(object, callback).await.unwrap();
    let request_id = match h.next_sent().await {
        ClientMessage::RequestOwnership {
            object: o,
            requester,
            request_id,
        } => {
            assert_eq!((o, requester), (object, ME));
            request_id
        }
        other => panic!("unexpected {other:?}"),
    };

    h.push(ServerMessage::OwnershipResult {
        object,
        request_id,
        granted: true,
    })
    .await;
    h.push(ownership(object, OwnershipState::owned_by(ME), 3)).await;
    assert_eq!(rx.await.unwrap(), AttemptOutcome::Succeeded);
    h.next_event(|e| matches!(e, ClientEvent::Applied(ServerMessage::OwnershipChanged { .. })))
        .await;

    let state = h.handle.ownership_of(object).await.unwrap().unwrap();
    assert_eq!(state.version, 3);
    assert!(state.value.is_owned_by(ME));
}

#[tokio::test]
async fn stale_ownership_broadcast_is_not_applied() {
    let mut h = start();
    let object = ObjectId::new();
    h.push(ownership(object, OwnershipState::owned_by(ME), 4)).await;
    h.next_event(|e| matches!(e, ClientEvent::Applied(_))).await;
    h.push(ownership(object, OwnershipState::unowned(), 2)).await;

    let state = h.handle.ownership_of(object).await.unwrap().unwrap();
    assert_eq!(state.version, 4);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn release_sends_revoke_with_own_identity() {
    let mut h = start();
    let object = ObjectId::new();
    h.handle.release(object).await.unwrap();

    assert_eq!(
        h.next_sent().await,
        ClientMessage::RevokeOwnership {
            object,
            requester: ME
        }
    );
}

#[tokio::test]
async fn report_position_is_forwarded() {
    let mut h = start();
    let object = ObjectId::new();
    let position = Vec3::new(3.0, 0.5, -2.0);
    h.handle.report_position(object, position).await.unwrap();

    assert_eq!(
        h.next_sent().await,
        ClientMessage::ReportPosition { object, position }
    );
}

// ── Disposal ────────────────────────────────────────────────────

#[tokio::test]
async fn disposal_rejection_is_surfaced() {
    let mut h = start();
    let disposer = ObjectId::new();
    h.push(ServerMessage::DisposalRejected { disposer }).await;

    let event = h
        .next_event(|e| matches!(e, ClientEvent::DisposalRejected { .. }))
        .await;
    assert_eq!(event, ClientEvent::DisposalRejected { disposer });
}

// ── Shutdown ────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_cancels_pending_attempt() {
    let mut h = start();
    h.assign_actor().await;

    let (callback, rx) = outcome_channel();
    h.handle.start_interact(ObjectId::new(), callback).await.unwrap();
    h.sent_interact().await;

    h.handle.shutdown().await.unwrap();
    assert_eq!(rx.await.unwrap(), AttemptOutcome::Failed(AttemptFailure::Cancelled));
    assert!(h.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn transport_close_ends_session() {
    let mut h = start();
    h.assign_actor().await;

    let (callback, rx) = outcome_channel();
    h.handle.start_interact(ObjectId::new(), callback).await.unwrap();
    h.sent_interact().await;

    drop(h.inbound);
    assert_eq!(rx.await.unwrap(), AttemptOutcome::Failed(AttemptFailure::Cancelled));
    assert!(h.task.await.unwrap().is_ok());
    assert!(matches!(
        h.handle.release(ObjectId::new()).await,
        Err(ClientError::ChannelClosed)
    ));
}
