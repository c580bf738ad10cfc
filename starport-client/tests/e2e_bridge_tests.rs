//! End-to-end tests: an authority node and several client sessions joined by
//! an in-process hub that plays the role of the network.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use starport_authority::{
    create_authority_node, AllowAll, AuthorityConfig, AuthorityError, AuthorityEvent,
    AuthorityResult, DeviceBinding, Dispenser, GatewaySetup, InteractionContext,
    InteractionPolicy, NodeHandle, NodeTransport, TemplateConfig, TransportEvent,
};
use starport_client::{
    create_client_session, AttemptFailure, AttemptOutcome, ClientConfig, ClientError, ClientEvent,
    ClientHandle, ClientResult, ClientTransport,
};
use starport_types::{
    ClientId, ClientMessage, ObjectId, ServerMessage, TemplateId, Transform, Vec3,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

const A: ClientId = ClientId(1);
const B: ClientId = ClientId(2);

// ── Hub ─────────────────────────────────────────────────────────

struct Hub {
    to_node: mpsc::Sender<TransportEvent>,
    links: std::sync::Mutex<HashMap<ClientId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl Hub {
    fn link(&self, client: ClientId) -> Option<mpsc::UnboundedSender<ServerMessage>> {
        self.links.lock().unwrap().get(&client).cloned()
    }

    fn all_links(&self) -> Vec<mpsc::UnboundedSender<ServerMessage>> {
        self.links.lock().unwrap().values().cloned().collect()
    }
}

struct NodeSide {
    incoming: Mutex<mpsc::Receiver<TransportEvent>>,
    hub: Arc<Hub>,
}

#[async_trait]
impl NodeTransport for NodeSide {
    async fn recv(&self) -> Option<TransportEvent> {
        self.incoming.lock().await.recv().await
    }

    async fn send_to(&self, client: ClientId, message: ServerMessage) -> AuthorityResult<()> {
        let link = self
            .hub
            .link(client)
            .ok_or_else(|| AuthorityError::Transport(format!("{client} not linked")))?;
        link.send(message)
            .map_err(|_| AuthorityError::Transport(format!("{client} link closed")))
    }

    async fn broadcast(&self, message: ServerMessage) -> AuthorityResult<()> {
        for link in self.hub.all_links() {
            let _ = link.send(message.clone());
        }
        Ok(())
    }
}

struct ClientSide {
    id: ClientId,
    incoming: Mutex<mpsc::UnboundedReceiver<ServerMessage>>,
    hub: Arc<Hub>,
}

#[async_trait]
impl ClientTransport for ClientSide {
    async fn recv(&self) -> Option<ServerMessage> {
        self.incoming.lock().await.recv().await
    }

    async fn send(&self, message: ClientMessage) -> ClientResult<()> {
        self.hub
            .to_node
            .send(TransportEvent::Message {
                sender: self.id,
                message,
            })
            .await
            .map_err(|_| ClientError::Transport("node gone".into()))
    }
}

/// Never decides.
struct Undecided;

#[async_trait]
impl InteractionPolicy for Undecided {
    async fn decide(&self, _ctx: &InteractionContext) -> AuthorityResult<bool> {
        std::future::pending::<()>().await;
        Ok(true)
    }
}

// ── Harness ─────────────────────────────────────────────────────

struct World {
    hub: Arc<Hub>,
    node: NodeHandle,
    _node_events: mpsc::Receiver<AuthorityEvent>,
    _node_task: JoinHandle<AuthorityResult<()>>,
}

struct Participant {
    id: ClientId,
    handle: ClientHandle,
    events: mpsc::Receiver<ClientEvent>,
    _task: JoinHandle<ClientResult<()>>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("starport_authority=debug,starport_client=debug"))
        .with_test_writer()
        .try_init();
}

fn world(config: AuthorityConfig) -> World {
    init_tracing();
    let (node, node_events, command_rx, authority) = create_authority_node(config).unwrap();
    let (to_node, incoming) = mpsc::channel(64);
    let hub = Arc::new(Hub {
        to_node,
        links: std::sync::Mutex::new(HashMap::new()),
    });
    let transport = Arc::new(NodeSide {
        incoming: Mutex::new(incoming),
        hub: hub.clone(),
    });
    let node_task = tokio::spawn(authority.run(transport, command_rx));
    World {
        hub,
        node,
        _node_events: node_events,
        _node_task: node_task,
    }
}

impl World {
    /// Links a new participant and waits until it controls its actor.
    async fn join(&self, id: ClientId) -> Participant {
        let (handle, events, command_rx, session) =
            create_client_session(id, ClientConfig::default()).unwrap();
        let (link, incoming) = mpsc::unbounded_channel();
        self.hub.links.lock().unwrap().insert(id, link);
        let transport = Arc::new(ClientSide {
            id,
            incoming: Mutex::new(incoming),
            hub: self.hub.clone(),
        });
        let task = tokio::spawn(session.run(transport, command_rx));
        self.hub.to_node.send(TransportEvent::Connected(id)).await.unwrap();

        let mut participant = Participant {
            id,
            handle,
            events,
            _task: task,
        };
        participant
            .wait_for(|e| matches!(e, ClientEvent::ActorReady(_)))
            .await;
        participant
    }

    async fn leave(&self, id: ClientId) {
        self.hub.links.lock().unwrap().remove(&id);
        self.hub.to_node.send(TransportEvent::Disconnected(id)).await.unwrap();
    }
}

impl Participant {
    async fn wait_for(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for client event")
                .expect("client event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn wait_owner(&mut self, object: ObjectId, owner: Option<ClientId>) {
        self.wait_for(|e| {
            matches!(e, ClientEvent::Applied(ServerMessage::OwnershipChanged { object: o, state })
                if *o == object && state.value.owner() == owner)
        })
        .await;
    }
}

fn crate_config() -> AuthorityConfig {
    AuthorityConfig::default().with_template(TemplateConfig::new("crate").with_cap(4))
}

// ── Ownership ───────────────────────────────────────────────────

#[tokio::test]
async fn contended_pickup_has_exactly_one_winner() {
    let w = world(AuthorityConfig::default());
    let object = ObjectId::new();
    w.node.register_object(object).await.unwrap();
    let a = w.join(A).await;
    let b = w.join(B).await;

    let (first, second) = tokio::join!(a.handle.pick_up(object), b.handle.pick_up(object));
    let outcomes = [(A, first.unwrap()), (B, second.unwrap())];

    let winners: Vec<ClientId> = outcomes
        .iter()
        .filter(|(_, o)| o.is_success())
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(winners.len(), 1);
    for (_, outcome) in outcomes.iter().filter(|(_, o)| !o.is_success()) {
        assert!(matches!(
            outcome,
            AttemptOutcome::Failed(AttemptFailure::Denied | AttemptFailure::Unavailable)
        ));
    }

    let state = w.node.snapshot(object).await.unwrap().unwrap();
    assert_eq!(state.value.owner(), Some(winners[0]));
}

#[tokio::test]
async fn disconnect_hands_object_to_the_next_participant() {
    let w = world(AuthorityConfig::default());
    let object = ObjectId::new();
    w.node.register_object(object).await.unwrap();
    let a = w.join(A).await;
    let mut b = w.join(B).await;

    assert_eq!(a.handle.pick_up(object).await.unwrap(), AttemptOutcome::Succeeded);
    b.wait_owner(object, Some(a.id)).await;
    assert_eq!(
        b.handle.pick_up(object).await.unwrap(),
        AttemptOutcome::Failed(AttemptFailure::Unavailable)
    );

    w.leave(a.id).await;
    b.wait_owner(object, None).await;

    assert_eq!(b.handle.pick_up(object).await.unwrap(), AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn released_object_becomes_free_for_others() {
    let w = world(AuthorityConfig::default());
    let object = ObjectId::new();
    w.node.register_object(object).await.unwrap();
    let mut a = w.join(A).await;
    let mut b = w.join(B).await;

    assert_eq!(a.handle.pick_up(object).await.unwrap(), AttemptOutcome::Succeeded);
    a.wait_owner(object, Some(A)).await;
    a.handle.release(object).await.unwrap();
    b.wait_owner(object, None).await;

    assert_eq!(b.handle.pick_up(object).await.unwrap(), AttemptOutcome::Succeeded);
    a.wait_owner(object, Some(B)).await;
}

// ── Interaction ─────────────────────────────────────────────────

#[tokio::test]
async fn dispenser_use_replicates_the_new_object() {
    let w = world(crate_config());
    let dispenser = ObjectId::new();
    w.node
        .host_gateway(
            dispenser,
            GatewaySetup::new(Arc::new(AllowAll)).with_binding(DeviceBinding::Dispenser(
                Dispenser::new(TemplateId::new("crate"), Transform::at(Vec3::new(0.0, 0.0, 4.0))),
            )),
        )
        .await
        .unwrap();
    let mut a = w.join(A).await;
    let mut b = w.join(B).await;

    assert_eq!(a.handle.interact(dispenser).await.unwrap(), AttemptOutcome::Succeeded);

    let spawned = |e: &ClientEvent| {
        matches!(e, ClientEvent::Applied(ServerMessage::SpawnNotify { template, .. })
            if template.as_str() == "crate")
    };
    let object = match b.wait_for(spawned).await {
        ClientEvent::Applied(ServerMessage::SpawnNotify { object, .. }) => object,
        other => panic!("unexpected {other:?}"),
    };
    a.wait_for(spawned).await;

    assert_eq!(b.handle.pick_up(object).await.unwrap(), AttemptOutcome::Succeeded);
    a.wait_owner(object, Some(B)).await;
    let seen_by_a = a.handle.ownership_of(object).await.unwrap().unwrap();
    assert!(seen_by_a.value.is_owned_by(B));
}

#[tokio::test(start_paused = true)]
async fn undecided_policy_is_denied_before_the_client_gives_up() {
    let w = world(AuthorityConfig::default());
    let gateway = ObjectId::new();
    w.node
        .host_gateway(gateway, GatewaySetup::new(Arc::new(Undecided)))
        .await
        .unwrap();
    let a = w.join(A).await;

    assert_eq!(
        a.handle.interact(gateway).await.unwrap(),
        AttemptOutcome::Failed(AttemptFailure::Denied)
    );
}
