//! Authority node: the event loop that owns every piece of authority state.
//!
//! All registry, gateway and spawn mutations happen on this loop in arrival
//! order. Policy decisions run off-loop and come back through an in-flight
//! set, so a slow policy never stalls message processing.
//!
//! ```text
//! transport ─▶ AuthorityNode::run ─▶ handler (by MessageKind) ─▶ Vec<Outbound>
//!                   │                                                 │
//! NodeHandle ──────▶│◀── decision futures                             ▼
//!                   └──▶ AuthorityEvent (game logic)        transport send / broadcast
//! ```

use crate::actors::ActorDirectory;
use crate::config::AuthorityConfig;
use crate::devices::{DeviceBinding, Disposer};
use crate::dispatch::{Outbound, ValidatedSender};
use crate::error::{AuthorityError, AuthorityResult};
use crate::events::AuthorityEvent;
use crate::gateway::{Admission, DecisionOutcome, InteractionGateway};
use crate::policy::{AllowWhenEnabled, InteractionPolicy};
use crate::reconciler::DisconnectReconciler;
use crate::registry::{AuthorityRegistry, NodeRole, OwnershipDecision, RevokeOutcome};
use crate::spawn::{LocalObjectFactory, ObjectFactory, SpawnCoordinator, SpawnFailure};
use crate::transport::{NodeTransport, TransportEvent};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use starport_types::{
    ActorRef, ClientId, ClientMessage, ObjectId, OwnershipState, RequestId, ServerMessage,
    SpawnFailureReason, TemplateId, Transform, Vec3, Versioned,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a gateway is set up when an object starts hosting one.
pub struct GatewaySetup {
    pub policy: Arc<dyn InteractionPolicy>,
    pub description: Option<String>,
    pub binding: Option<DeviceBinding>,
}

impl GatewaySetup {
    pub fn new(policy: Arc<dyn InteractionPolicy>) -> Self {
        Self {
            policy,
            description: None,
            binding: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_binding(mut self, binding: DeviceBinding) -> Self {
        self.binding = Some(binding);
        self
    }
}

impl Default for GatewaySetup {
    fn default() -> Self {
        Self::new(Arc::new(AllowWhenEnabled))
    }
}

/// Commands from host-side game logic to the node loop.
pub enum NodeCommand {
    /// Attach an unowned record to a scene object.
    RegisterObject {
        object: ObjectId,
        reply: oneshot::Sender<AuthorityResult<()>>,
    },
    /// Make `object` host an interaction gateway.
    HostGateway {
        object: ObjectId,
        setup: GatewaySetup,
        reply: oneshot::Sender<AuthorityResult<()>>,
    },
    Spawn {
        template: TemplateId,
        transform: Transform,
        reply: oneshot::Sender<Result<ObjectId, SpawnFailure>>,
    },
    Despawn {
        object: ObjectId,
    },
    SetGrantable {
        object: ObjectId,
        grantable: bool,
    },
    ForceRevoke {
        object: ObjectId,
    },
    SetInteractionAllowed {
        gateway: ObjectId,
        allowed: bool,
    },
    SetDescription {
        gateway: ObjectId,
        description: String,
    },
    /// Position report from the node's own physics.
    ReportPosition {
        object: ObjectId,
        position: Vec3,
    },
    Snapshot {
        object: ObjectId,
        reply: oneshot::Sender<Option<Versioned<OwnershipState>>>,
    },
    Shutdown,
}

/// Handle for sending commands to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    pub async fn send(&self, command: NodeCommand) -> AuthorityResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AuthorityError::ChannelClosed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> NodeCommand) -> AuthorityResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx.await.map_err(|_| AuthorityError::ChannelClosed)
    }

    pub async fn register_object(&self, object: ObjectId) -> AuthorityResult<()> {
        self.request(|reply| NodeCommand::RegisterObject { object, reply })
            .await?
    }

    pub async fn host_gateway(&self, object: ObjectId, setup: GatewaySetup) -> AuthorityResult<()> {
        self.request(|reply| NodeCommand::HostGateway { object, setup, reply })
            .await?
    }

    /// Outer error means the node is gone; inner error is the spawn outcome.
    pub async fn spawn(
        &self,
        template: TemplateId,
        transform: Transform,
    ) -> AuthorityResult<Result<ObjectId, SpawnFailure>> {
        self.request(|reply| NodeCommand::Spawn {
            template,
            transform,
            reply,
        })
        .await
    }

    pub async fn despawn(&self, object: ObjectId) -> AuthorityResult<()> {
        self.send(NodeCommand::Despawn { object }).await
    }

    pub async fn set_grantable(&self, object: ObjectId, grantable: bool) -> AuthorityResult<()> {
        self.send(NodeCommand::SetGrantable { object, grantable }).await
    }

    pub async fn force_revoke(&self, object: ObjectId) -> AuthorityResult<()> {
        self.send(NodeCommand::ForceRevoke { object }).await
    }

    pub async fn set_interaction_allowed(&self, gateway: ObjectId, allowed: bool) -> AuthorityResult<()> {
        self.send(NodeCommand::SetInteractionAllowed { gateway, allowed }).await
    }

    pub async fn set_description(&self, gateway: ObjectId, description: impl Into<String>) -> AuthorityResult<()> {
        self.send(NodeCommand::SetDescription {
            gateway,
            description: description.into(),
        })
        .await
    }

    pub async fn report_position(&self, object: ObjectId, position: Vec3) -> AuthorityResult<()> {
        self.send(NodeCommand::ReportPosition { object, position }).await
    }

    pub async fn snapshot(&self, object: ObjectId) -> AuthorityResult<Option<Versioned<OwnershipState>>> {
        self.request(|reply| NodeCommand::Snapshot { object, reply }).await
    }

    pub async fn shutdown(&self) -> AuthorityResult<()> {
        self.send(NodeCommand::Shutdown).await
    }
}

/// The authority node. Consumed by [`AuthorityNode::run`].
pub struct AuthorityNode {
    config: AuthorityConfig,
    registry: AuthorityRegistry,
    gateways: HashMap<ObjectId, InteractionGateway>,
    bindings: HashMap<ObjectId, DeviceBinding>,
    actors: ActorDirectory,
    spawner: SpawnCoordinator,
    reconciler: DisconnectReconciler,
    connected: HashSet<ClientId>,
    next_actor_spawn: usize,
    decisions: FuturesUnordered<BoxFuture<'static, DecisionOutcome>>,
    event_tx: mpsc::Sender<AuthorityEvent>,
}

impl AuthorityNode {
    fn new(config: AuthorityConfig, factory: Box<dyn ObjectFactory>, event_tx: mpsc::Sender<AuthorityEvent>) -> Self {
        let spawner = SpawnCoordinator::new(NodeRole::Authority, &config, factory);
        Self {
            config,
            registry: AuthorityRegistry::authority(),
            gateways: HashMap::new(),
            bindings: HashMap::new(),
            actors: ActorDirectory::new(),
            spawner,
            reconciler: DisconnectReconciler::new(),
            connected: HashSet::new(),
            next_actor_spawn: 0,
            decisions: FuturesUnordered::new(),
            event_tx,
        }
    }

    /// Runs until shutdown, the command channel closing, or the transport closing.
    pub async fn run(
        mut self,
        transport: Arc<dyn NodeTransport>,
        mut command_rx: mpsc::Receiver<NodeCommand>,
    ) -> AuthorityResult<()> {
        info!("[AUTHORITY] Node started");

        loop {
            let next_disposal = self.next_disposal_due();

            let mut outbound = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(NodeCommand::Shutdown) | None => {
                        info!("[AUTHORITY] Shutting down");
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },

                event = transport.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        info!("[AUTHORITY] Transport closed");
                        break;
                    }
                },

                Some(outcome) = self.decisions.next(), if !self.decisions.is_empty() => {
                    self.finish_decision(outcome)
                }

                _ = sleep_until_due(next_disposal), if next_disposal.is_some() => {
                    self.finish_due_disposals(Instant::now())
                }
            };

            outbound.extend(self.publish_changes());
            deliver(transport.as_ref(), outbound).await;
        }

        let failures = self.teardown_all();
        deliver(transport.as_ref(), failures).await;
        Ok(())
    }

    // ── Transport events ─────────────────────────────────────────

    fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<Outbound> {
        match event {
            TransportEvent::Connected(client) => self.on_connected(client),
            TransportEvent::Disconnected(client) => self.on_disconnected(client),
            TransportEvent::Message { sender, message } => {
                if !self.connected.contains(&sender) {
                    warn!("[AUTHORITY] Dropping {} from unconnected {}", message.kind(), sender);
                    return Vec::new();
                }
                self.dispatch(ValidatedSender::new(sender), message)
            }
        }
    }

    fn on_connected(&mut self, client: ClientId) -> Vec<Outbound> {
        if client.is_server() {
            warn!(target: "security", "[AUTHORITY] Refusing connection claiming the server identity");
            return Vec::new();
        }
        if !self.connected.insert(client) {
            debug!("[AUTHORITY] {} connected twice", client);
            return Vec::new();
        }
        info!("[AUTHORITY] {} connected", client);

        let mut out = self.welcome(client);

        let transform = self.next_actor_transform();
        let template = self.config.actor_template.clone();
        let object = match self.spawner.instantiate_untracked(&template, &transform) {
            Ok(object) => object,
            Err(e) => {
                error!("[AUTHORITY] Could not create actor for {}: {}", client, e);
                return out;
            }
        };
        let (actor, replaced) = self.actors.assign(client, object, transform);
        if let Some(old) = replaced {
            self.spawner.destroy_untracked(&old.0);
            out.push(Outbound::Broadcast(ServerMessage::ActorRemoved { actor: old }));
        }
        out.push(Outbound::Broadcast(ServerMessage::ActorAssigned {
            actor,
            owner: client,
            transform,
        }));
        self.emit(AuthorityEvent::ClientConnected { client, actor });
        out
    }

    /// Current world state, unicast to a client that just joined.
    fn welcome(&self, client: ClientId) -> Vec<Outbound> {
        let mut out = Vec::new();
        for (object, template, position) in self.spawner.instances() {
            out.push(Outbound::Unicast(
                client,
                ServerMessage::SpawnNotify {
                    object,
                    template,
                    transform: Transform::at(position),
                },
            ));
        }
        for (object, state) in self.registry.snapshots() {
            out.push(Outbound::Unicast(client, ServerMessage::OwnershipChanged { object, state }));
        }
        let mut gateways: Vec<_> = self.gateways.values().collect();
        gateways.sort_by_key(|g| g.object());
        for gateway in gateways {
            out.push(Outbound::Unicast(
                client,
                ServerMessage::InteractableChanged {
                    gateway: gateway.object(),
                    state: gateway.interactable().clone(),
                },
            ));
        }
        for (actor, entry) in self.actors.entries() {
            out.push(Outbound::Unicast(
                client,
                ServerMessage::ActorAssigned {
                    actor,
                    owner: entry.owner,
                    transform: entry.transform,
                },
            ));
        }
        out
    }

    fn next_actor_transform(&mut self) -> Transform {
        let points = &self.config.actor_spawn_points;
        if points.is_empty() {
            return Transform::default();
        }
        let transform = points[self.next_actor_spawn % points.len()];
        self.next_actor_spawn = self.next_actor_spawn.wrapping_add(1);
        transform
    }

    fn on_disconnected(&mut self, client: ClientId) -> Vec<Outbound> {
        self.connected.remove(&client);
        let report = match self
            .reconciler
            .reconcile(client, &mut self.registry, &mut self.gateways, &mut self.actors)
        {
            Ok(report) => report,
            Err(e) => {
                error!("[AUTHORITY] Reconciling {} failed: {}", client, e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        if let Some(actor) = report.removed_actor {
            self.spawner.destroy_untracked(&actor.0);
            out.push(Outbound::Broadcast(ServerMessage::ActorRemoved { actor }));
        }
        if !report.is_empty() {
            self.emit(AuthorityEvent::ClientDisconnected { report });
        }
        out
    }

    // ── Client messages ──────────────────────────────────────────

    fn dispatch(&mut self, sender: ValidatedSender, message: ClientMessage) -> Vec<Outbound> {
        debug!("[AUTHORITY] {} from {}", message.kind(), sender.id());
        match message {
            ClientMessage::RequestOwnership {
                object,
                requester,
                request_id,
            } => self.on_request_ownership(sender, object, requester, request_id),
            ClientMessage::RevokeOwnership { object, requester } => {
                self.on_revoke_ownership(sender, object, requester)
            }
            ClientMessage::RequestInteract {
                gateway,
                actor,
                sender: claimed,
                request_id,
            } => self.on_request_interact(sender, gateway, actor, claimed, request_id),
            ClientMessage::ReportPosition { object, position } => {
                self.on_report_position(sender, object, position)
            }
        }
    }

    fn on_request_ownership(
        &mut self,
        sender: ValidatedSender,
        object: ObjectId,
        requester: ClientId,
        request_id: RequestId,
    ) -> Vec<Outbound> {
        let granted = if requester != sender.id() {
            warn!(
                target: "security",
                "[AUTHORITY] spoof: sender {} requested {} as {}", sender.id(), object, requester
            );
            false
        } else {
            match self.registry.request_ownership(&object, sender.id()) {
                Ok(OwnershipDecision::Granted) => true,
                Ok(OwnershipDecision::Denied(reason)) => {
                    debug!("[AUTHORITY] {} denied {}: {:?}", object, sender.id(), reason);
                    false
                }
                Err(e) => {
                    debug!("[AUTHORITY] Ownership request for {} failed: {}", object, e);
                    false
                }
            }
        };

        vec![Outbound::Unicast(
            sender.id(),
            ServerMessage::OwnershipResult {
                object,
                request_id,
                granted,
            },
        )]
    }

    fn on_revoke_ownership(&mut self, sender: ValidatedSender, object: ObjectId, requester: ClientId) -> Vec<Outbound> {
        if requester != sender.id() {
            warn!(
                target: "security",
                "[AUTHORITY] spoof: sender {} revoked {} as {}", sender.id(), object, requester
            );
            return Vec::new();
        }
        match self.registry.revoke_ownership(&object, sender.id()) {
            Ok(RevokeOutcome::Revoked) | Ok(RevokeOutcome::Ignored) => {}
            Err(e) => debug!("[AUTHORITY] Revoke of {} failed: {}", object, e),
        }
        Vec::new()
    }

    fn on_request_interact(
        &mut self,
        sender: ValidatedSender,
        gateway_id: ObjectId,
        actor: ActorRef,
        claimed: ClientId,
        request_id: RequestId,
    ) -> Vec<Outbound> {
        let ownership = self.registry.snapshot(&gateway_id).map(|s| s.value);
        let Some(gateway) = self.gateways.get_mut(&gateway_id) else {
            debug!("[AUTHORITY] Interact request for missing gateway {}", gateway_id);
            return vec![interact_result(sender.id(), gateway_id, request_id, false)];
        };

        match gateway.accept(sender.id(), claimed, actor, request_id, &self.actors, ownership) {
            Admission::Rejected {
                reply_to,
                request_id,
                reason,
            } => {
                debug!("[AUTHORITY] Rejected interact on {} from {}: {:?}", gateway_id, reply_to, reason);
                vec![interact_result(reply_to, gateway_id, request_id, false)]
            }
            Admission::Admitted(decision) => {
                let timeout = self.config.policy_timeout();
                self.decisions.push(decision.evaluate(timeout).boxed());
                Vec::new()
            }
        }
    }

    fn on_report_position(&mut self, sender: ValidatedSender, object: ObjectId, position: Vec3) -> Vec<Outbound> {
        if self.registry.owner_of(&object) != Some(sender.id()) {
            debug!("[AUTHORITY] Ignoring position of {} from non-owner {}", object, sender.id());
            return Vec::new();
        }
        self.spawner.report_position(&object, position);
        Vec::new()
    }

    // ── Decisions and devices ────────────────────────────────────

    fn finish_decision(&mut self, outcome: DecisionOutcome) -> Vec<Outbound> {
        let Some(gateway) = self.gateways.get_mut(&outcome.gateway) else {
            debug!("[AUTHORITY] Discarding decision for removed gateway {}", outcome.gateway);
            return Vec::new();
        };
        let Some(done) = gateway.complete(&outcome) else {
            debug!("[AUTHORITY] Discarding stale decision on {} for {}", outcome.gateway, outcome.requester);
            return Vec::new();
        };

        self.emit(AuthorityEvent::InteractionUsed {
            gateway: outcome.gateway,
            requester: done.requester,
            actor: done.actor,
            success: done.success,
        });

        let mut out = Vec::new();
        if done.success {
            out.extend(self.run_binding(outcome.gateway));
        }
        out.push(interact_result(done.requester, outcome.gateway, done.request_id, done.success));
        out
    }

    fn run_binding(&mut self, gateway: ObjectId) -> Vec<Outbound> {
        let Some(mut binding) = self.bindings.remove(&gateway) else {
            return Vec::new();
        };
        let out = match &mut binding {
            DeviceBinding::Dispenser(dispenser) => {
                let (template, transform) = (dispenser.template.clone(), dispenser.spawn_point);
                self.spawn(template, transform).0
            }
            DeviceBinding::Disposer(disposer) => self.start_disposal(gateway, disposer),
        };
        self.bindings.insert(gateway, binding);
        out
    }

    fn start_disposal(&mut self, gateway: ObjectId, disposer: &mut Disposer) -> Vec<Outbound> {
        let items: Vec<ObjectId> = self
            .spawner
            .instances_in(&disposer.volume)
            .into_iter()
            .filter(|item| *item != gateway && self.registry.owner_of(item).is_none())
            .collect();

        let default_duration = self.config.disposal_duration();
        let items = match disposer.begin(items, Instant::now(), default_duration) {
            Ok(disposal) => disposal.items.clone(),
            Err(_) => {
                info!("[AUTHORITY] Disposer {} is already disposing", gateway);
                self.emit(AuthorityEvent::DisposalRejected { gateway });
                return vec![Outbound::Broadcast(ServerMessage::DisposalRejected { disposer: gateway })];
            }
        };

        for item in &items {
            if let Err(e) = self.registry.set_grantable(item, false) {
                warn!("[AUTHORITY] Could not lock {} for disposal: {}", item, e);
            }
        }

        let mut out = self.publish_changes();
        out.extend(self.set_interaction_allowed(gateway, false));
        info!("[AUTHORITY] Disposer {} disposing {} items", gateway, items.len());
        out.push(Outbound::Broadcast(ServerMessage::DisposalStarted {
            disposer: gateway,
            pending: items.len(),
        }));
        self.emit(AuthorityEvent::DisposalStarted { gateway, items });
        out
    }

    fn next_disposal_due(&self) -> Option<Instant> {
        self.bindings
            .values()
            .filter_map(|b| match b {
                DeviceBinding::Disposer(d) => d.due(),
                DeviceBinding::Dispenser(_) => None,
            })
            .min()
    }

    fn finish_due_disposals(&mut self, now: Instant) -> Vec<Outbound> {
        let mut due: Vec<(ObjectId, Vec<ObjectId>)> = self
            .bindings
            .iter_mut()
            .filter_map(|(id, b)| match b {
                DeviceBinding::Disposer(d) => d.finish_if_due(now).map(|items| (*id, items)),
                DeviceBinding::Dispenser(_) => None,
            })
            .collect();
        due.sort_by_key(|(id, _)| *id);

        let mut out = Vec::new();
        for (gateway, items) in due {
            let disposed = items
                .into_iter()
                .filter(|item| self.despawn_object(*item, &mut out))
                .count();
            out.extend(self.set_interaction_allowed(gateway, true));
            info!("[AUTHORITY] Disposer {} disposed {} items", gateway, disposed);
            out.push(Outbound::Broadcast(ServerMessage::DisposalCompleted {
                disposer: gateway,
                disposed,
            }));
            self.emit(AuthorityEvent::DisposalCompleted { gateway, disposed });
        }
        out
    }

    // ── Commands ─────────────────────────────────────────────────

    fn handle_command(&mut self, command: NodeCommand) -> Vec<Outbound> {
        match command {
            NodeCommand::RegisterObject { object, reply } => {
                let result = self.registry.register(object);
                let out = match (&result, self.registry.snapshot(&object)) {
                    (Ok(()), Some(state)) => {
                        vec![Outbound::Broadcast(ServerMessage::OwnershipChanged { object, state })]
                    }
                    _ => Vec::new(),
                };
                let _ = reply.send(result);
                out
            }
            NodeCommand::HostGateway { object, setup, reply } => {
                let (result, out) = self.host_gateway(object, setup);
                let _ = reply.send(result);
                out
            }
            NodeCommand::Spawn {
                template,
                transform,
                reply,
            } => {
                let (out, result) = self.spawn(template, transform);
                let _ = reply.send(result);
                out
            }
            NodeCommand::Despawn { object } => {
                let mut out = Vec::new();
                self.despawn_object(object, &mut out);
                out
            }
            NodeCommand::SetGrantable { object, grantable } => {
                if let Err(e) = self.registry.set_grantable(&object, grantable) {
                    warn!("[AUTHORITY] SetGrantable on {} failed: {}", object, e);
                }
                Vec::new()
            }
            NodeCommand::ForceRevoke { object } => {
                if let Err(e) = self.registry.force_revoke(&object) {
                    warn!("[AUTHORITY] ForceRevoke on {} failed: {}", object, e);
                }
                Vec::new()
            }
            NodeCommand::SetInteractionAllowed { gateway, allowed } => {
                self.set_interaction_allowed(gateway, allowed)
            }
            NodeCommand::SetDescription { gateway, description } => {
                match self.gateways.get_mut(&gateway) {
                    Some(g) => g
                        .set_description(description)
                        .map(|state| vec![Outbound::Broadcast(ServerMessage::InteractableChanged { gateway, state })])
                        .unwrap_or_default(),
                    None => {
                        warn!("[AUTHORITY] {}", AuthorityError::UnknownGateway(gateway));
                        Vec::new()
                    }
                }
            }
            NodeCommand::ReportPosition { object, position } => {
                self.spawner.report_position(&object, position);
                Vec::new()
            }
            NodeCommand::Snapshot { object, reply } => {
                let _ = reply.send(self.registry.snapshot(&object));
                Vec::new()
            }
            // Handled by the run loop.
            NodeCommand::Shutdown => Vec::new(),
        }
    }

    fn host_gateway(&mut self, object: ObjectId, setup: GatewaySetup) -> (AuthorityResult<()>, Vec<Outbound>) {
        if self.gateways.contains_key(&object) {
            return (Err(AuthorityError::AlreadyRegistered(object)), Vec::new());
        }
        let mut gateway = InteractionGateway::new(object, setup.policy);
        if let Some(description) = setup.description {
            gateway = gateway.with_description(description);
        }
        let state = gateway.interactable().clone();
        self.gateways.insert(object, gateway);
        if let Some(binding) = setup.binding {
            self.bindings.insert(object, binding);
        }
        info!("[AUTHORITY] {} now hosts a gateway", object);
        (
            Ok(()),
            vec![Outbound::Broadcast(ServerMessage::InteractableChanged { gateway: object, state })],
        )
    }

    fn set_interaction_allowed(&mut self, gateway: ObjectId, allowed: bool) -> Vec<Outbound> {
        match self.gateways.get_mut(&gateway) {
            Some(g) => g
                .set_allowed(allowed)
                .map(|state| vec![Outbound::Broadcast(ServerMessage::InteractableChanged { gateway, state })])
                .unwrap_or_default(),
            None => {
                warn!("[AUTHORITY] {}", AuthorityError::UnknownGateway(gateway));
                Vec::new()
            }
        }
    }

    fn spawn(&mut self, template: TemplateId, transform: Transform) -> (Vec<Outbound>, Result<ObjectId, SpawnFailure>) {
        match self
            .spawner
            .spawn_under_authority(&template, transform, &mut self.registry)
        {
            Ok(spawned) => {
                let out = vec![Outbound::Broadcast(ServerMessage::SpawnNotify {
                    object: spawned.object,
                    template: spawned.template.clone(),
                    transform: spawned.transform,
                })];
                let object = spawned.object;
                self.emit(AuthorityEvent::SpawnSucceeded(spawned));
                (out, Ok(object))
            }
            Err(failure) => {
                let out = match failure.broadcast_reason() {
                    Some(reason) => {
                        self.emit(match reason {
                            SpawnFailureReason::Blocked => AuthorityEvent::SpawnBlocked {
                                template: template.clone(),
                            },
                            SpawnFailureReason::LimitReached => AuthorityEvent::SpawnLimitReached {
                                template: template.clone(),
                            },
                        });
                        vec![Outbound::Broadcast(ServerMessage::SpawnFailed { template, reason })]
                    }
                    None => {
                        warn!("[SPAWN] Spawn of {} failed: {}", template, failure);
                        Vec::new()
                    }
                };
                (out, Err(failure))
            }
        }
    }

    /// Destroys `object` everywhere it is known. Returns false if it was unknown.
    fn despawn_object(&mut self, object: ObjectId, out: &mut Vec<Outbound>) -> bool {
        let mut known = match self.registry.remove(&object) {
            Ok(_) => true,
            Err(AuthorityError::UnknownObject(_)) => false,
            Err(e) => {
                warn!("[AUTHORITY] Removing record of {} failed: {}", object, e);
                false
            }
        };
        out.extend(self.publish_changes());

        if let Some(mut gateway) = self.gateways.remove(&object) {
            known = true;
            for (client, request_id) in gateway.teardown() {
                out.push(interact_result(client, object, request_id, false));
            }
        }
        if let Some(DeviceBinding::Disposer(mut disposer)) = self.bindings.remove(&object) {
            let items = disposer.abandon();
            for item in &items {
                if let Err(e) = self.registry.set_grantable(item, true) {
                    warn!("[AUTHORITY] Could not unlock {} after disposer {} went away: {}", item, object, e);
                }
            }
            if !items.is_empty() {
                info!("[AUTHORITY] Disposer {} despawned mid-disposal, released {} items", object, items.len());
                out.extend(self.publish_changes());
            }
        }
        for binding in self.bindings.values_mut() {
            if let DeviceBinding::Disposer(disposer) = binding {
                disposer.forget(&object);
            }
        }
        if self.spawner.despawn(&object).is_some() {
            known = true;
        }

        if !known {
            debug!("[AUTHORITY] Despawn of unknown object {}", object);
            return false;
        }
        out.push(Outbound::Broadcast(ServerMessage::Despawned { object }));
        self.emit(AuthorityEvent::Despawned { object });
        true
    }

    /// Fails every pending request on every gateway.
    fn teardown_all(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        for gateway in self.gateways.values_mut() {
            let object = gateway.object();
            for (client, request_id) in gateway.teardown() {
                out.push(interact_result(client, object, request_id, false));
            }
        }
        out
    }

    // ── Publication ──────────────────────────────────────────────

    /// Drains queued ownership transitions into broadcasts and events.
    fn publish_changes(&mut self) -> Vec<Outbound> {
        self.registry
            .take_publications()
            .into_iter()
            .map(|change| {
                self.emit(AuthorityEvent::OwnershipChanged {
                    object: change.object,
                    state: change.state.clone(),
                    cause: change.cause,
                });
                Outbound::Broadcast(ServerMessage::OwnershipChanged {
                    object: change.object,
                    state: change.state,
                })
            })
            .collect()
    }

    fn emit(&self, event: AuthorityEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            warn!("[AUTHORITY] Event channel full, dropping {:?}", event);
        }
    }
}

fn interact_result(client: ClientId, gateway: ObjectId, request_id: RequestId, success: bool) -> Outbound {
    Outbound::Unicast(
        client,
        ServerMessage::InteractResult {
            gateway,
            request_id,
            success,
        },
    )
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn deliver(transport: &dyn NodeTransport, outbound: Vec<Outbound>) {
    for message in outbound {
        let result = match message {
            Outbound::Unicast(client, message) => transport.send_to(client, message).await,
            Outbound::Broadcast(message) => transport.broadcast(message).await,
        };
        if let Err(e) = result {
            warn!("[AUTHORITY] Send failed: {}", e);
        }
    }
}

/// Creates a node with the given factory.
///
/// Returns the command handle, the game-logic event receiver, the command
/// receiver to pass to [`AuthorityNode::run`], and the node itself.
pub fn create_authority_node_with_factory(
    config: AuthorityConfig,
    factory: Box<dyn ObjectFactory>,
) -> AuthorityResult<(NodeHandle, mpsc::Receiver<AuthorityEvent>, mpsc::Receiver<NodeCommand>, AuthorityNode)> {
    config.validate()?;
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let node = AuthorityNode::new(config, factory, event_tx);
    Ok((NodeHandle { command_tx }, event_rx, command_rx, node))
}

/// Creates a node whose objects exist only as ids.
pub fn create_authority_node(
    config: AuthorityConfig,
) -> AuthorityResult<(NodeHandle, mpsc::Receiver<AuthorityEvent>, mpsc::Receiver<NodeCommand>, AuthorityNode)> {
    create_authority_node_with_factory(config, Box::new(LocalObjectFactory))
}
