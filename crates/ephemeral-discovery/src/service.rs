//! Wires the registry, the bus and the gRPC transport together into one
//! running Discovery instance, and handles the startup sequencing in
//! §4.4.6: bind the frontend, announce `DiscoveryServiceStarted`, then
//! start accepting games.

use crate::federation::FederationSlave;
use crate::fsm::DiscoveryEvent;
use crate::networker::{LocalPortNetworker, Networker};
use crate::port_allocator::PortAllocator;
use crate::protocol::{DiscoveryMessage, PlayersPayload};
use crate::registry::GameRegistry;
use ephemeral_bus::{EventBus, Publisher};
use ephemeral_core::{topics, CoordError, DiscoveryConfig, Pod};
use ephemeral_transport::TransportServer;
use ephemeral_wire::proto::event_stream_server::EventStreamServer;
use ephemeral_wire::proto::WireEvent;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const NETWORKER_SYNC_INTERVAL: Duration = Duration::from_secs(15);

/// A running (or about-to-run) Discovery instance.
#[derive(Clone)]
pub struct DiscoveryService {
    config: DiscoveryConfig,
    registry: GameRegistry,
    publisher: Publisher,
    bus: EventBus,
    networker: Arc<dyn Networker>,
    federation_outbound: Option<mpsc::Sender<WireEvent>>,
    federation_inbound: Arc<Mutex<Option<mpsc::Receiver<WireEvent>>>>,
}

impl DiscoveryService {
    /// Construct a service from validated configuration.
    pub fn new(config: DiscoveryConfig) -> Result<Self, CoordError> {
        config.validate()?;
        let bus = EventBus::new(config.bus_capacity);
        let publisher = Publisher::new(bus.clone());
        let registry = GameRegistry::new(config.player_count);
        let allocator = Arc::new(Mutex::new(PortAllocator::new(config.port_range)));
        let networker = Arc::new(LocalPortNetworker::new(allocator));

        let is_master = config.federation.as_ref().map_or(true, |f| f.is_master);
        let (federation_outbound, federation_inbound) = if is_master {
            (None, None)
        } else {
            let (tx, rx) = mpsc::channel(64);
            (Some(tx), Some(rx))
        };

        Ok(Self {
            config,
            registry,
            publisher,
            bus,
            networker,
            federation_outbound,
            federation_inbound: Arc::new(Mutex::new(federation_inbound)),
        })
    }

    /// Registry handle, for tests and the federation bridge.
    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    /// Whether this instance is the federation master (or unfederated,
    /// which behaves identically to a standalone master).
    fn is_master(&self) -> bool {
        self.config.federation.as_ref().map_or(true, |f| f.is_master)
    }

    /// Run until `shutdown` fires: bind the gRPC frontend, announce
    /// startup, and dispatch incoming client messages until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoordError> {
        let addr = self
            .config
            .frontend_address
            .parse()
            .map_err(|err| CoordError::fatal(format!("invalid frontend_address: {err}")))?;

        let transport = TransportServer::new(self.bus.clone());
        let grpc_shutdown = shutdown.clone();
        let grpc_server = tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(EventStreamServer::new(transport))
                .serve_with_shutdown(addr, grpc_shutdown.cancelled())
                .await
        });

        self.publisher
            .publish("DiscoveryServiceStarted", topics::SERVICE_EVENTS)
            .await?;
        tracing::info!(address = %self.config.frontend_address, "discovery frontend listening");

        if let Some(federation) = self.config.federation.clone() {
            if !federation.is_master {
                let master_address = federation.peer_addresses.first().cloned().ok_or_else(|| {
                    CoordError::fatal("slave federation config has no master address")
                })?;
                let rx = self
                    .federation_inbound
                    .lock()
                    .await
                    .take()
                    .ok_or_else(|| CoordError::fatal("federation outbound channel already taken"))?;
                let slave_bus = self.bus.clone();
                let slave_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let slave = FederationSlave::new(master_address);
                    if let Err(err) = slave.run(rx, slave_bus, slave_shutdown).await {
                        tracing::error!(%err, "federation slave connection exited");
                    }
                });
            }
        }

        let sync_shutdown = shutdown.clone();
        let sync_task = {
            let service = self.clone();
            tokio::spawn(async move { service.networker_sync_loop(sync_shutdown).await })
        };

        let done_shutdown = shutdown.clone();
        let done_task = {
            let service = self.clone();
            tokio::spawn(async move { service.pod_deletion_loop(done_shutdown).await })
        };

        let outgoing_shutdown = shutdown.clone();
        let outgoing_bridge = {
            let service = self.clone();
            tokio::spawn(async move { service.outgoing_bridge_loop(outgoing_shutdown).await })
        };

        self.dispatch_loop(shutdown.clone()).await;
        let _ = outgoing_bridge.await;
        let _ = sync_task.await;
        let _ = done_task.await;

        grpc_server
            .await
            .map_err(|err| CoordError::fatal(err.to_string()))?
            .map_err(|err| CoordError::fatal(err.to_string()))
    }

    /// §4.4.5's periodic re-sync: every 15s, reconcile the Networker's
    /// bookkeeping against the ports this registry still has players
    /// attached to. Errors here are fatal (§4.4.5: "any error reported by
    /// the collaborator is fatal"), logged and the task exits; the service
    /// as a whole is expected to be restarted by its supervisor.
    async fn networker_sync_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(NETWORKER_SYNC_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let used = self.registry.allocated_ports().await;
                    if let Err(err) = self.networker.sync(&used).await {
                        tracing::error!(%err, "networker re-sync failed");
                        break;
                    }
                }
            }
        }
    }

    /// Drains the Networker's pod-deletion channel (§4.4.5): each reported
    /// pod has its `pod → playerID` entry erased from the registry. The
    /// Networker itself has already released the pod's port by the time
    /// this fires.
    async fn pod_deletion_loop(&self, shutdown: CancellationToken) {
        let mut deletions = self.networker.done_channel();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                pod = deletions.next() => {
                    let Some(pod) = pod else { break };
                    tracing::info!(%pod, "pod deleted, erasing discovery bookkeeping");
                    self.registry.forget_pod(&pod).await;
                }
            }
        }
    }

    async fn dispatch_loop(&self, shutdown: CancellationToken) {
        let rx = self.bus.subscribe(topics::CLIENT_INCOMING_EVENTS).await;
        let mut incoming = tokio_stream::wrappers::BroadcastStream::new(rx);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = incoming.next() => {
                    let Some(Ok(event)) = event else { break };
                    let Some(payload) = event.meta.wire_payload() else { continue };
                    match DiscoveryMessage::decode(payload) {
                        Ok(message) => {
                            let result = if self.is_master() {
                                self.handle_message(message).await
                            } else {
                                self.handle_message_as_slave(event.name.clone(), message).await
                            };
                            if let Err(err) = result {
                                tracing::warn!(%err, "failed to handle discovery message");
                            }
                        }
                        Err(err) => tracing::warn!(%err, "dropping malformed discovery message"),
                    }
                }
            }
        }
    }

    /// Bridges FSM transitions to clients (§4.4.3): every event an FSM
    /// raises on the discovery topic is translated into a wire event
    /// carrying the game's current player list and broadcast outward. A
    /// federation master also reflects it onto `broadcast`, the topic every
    /// `Scope::All` transport stream subscribes to, so connected slaves
    /// observe it too (§4.4.4).
    async fn outgoing_bridge_loop(&self, shutdown: CancellationToken) {
        let rx = self.bus.subscribe(topics::DISCOVERY).await;
        let mut discovery_events = tokio_stream::wrappers::BroadcastStream::new(rx);
        let reflect_to_slaves = self
            .config
            .federation
            .as_ref()
            .is_some_and(|f| f.is_master);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = discovery_events.next() => {
                    let Some(Ok(event)) = event else { break };
                    let Some(game_id) = event.game_id else { continue };
                    let players = self.registry.players_snapshot(game_id).await;
                    let payload = PlayersPayload { players }.encode();
                    let outgoing = ephemeral_core::Event::from_wire(
                        event.name.clone(),
                        Some(game_id),
                        payload.clone(),
                        topics::CLIENT_OUTGOING_EVENTS,
                        vec![topics::DISCOVERY.to_string()],
                    );
                    if let Err(err) = self.bus.publish(outgoing).await {
                        tracing::warn!(%err, "failed to publish outgoing wire event");
                    }
                    if reflect_to_slaves {
                        let to_slaves = ephemeral_core::Event::from_wire(
                            event.name,
                            Some(game_id),
                            payload,
                            topics::BROADCAST,
                            vec![topics::DISCOVERY.to_string()],
                        );
                        if let Err(err) = self.bus.publish(to_slaves).await {
                            tracing::warn!(%err, "failed to reflect outgoing wire event to slaves");
                        }
                    }
                }
            }
        }
    }

    /// Resolve the network port for a registering player (§4.4.2): a
    /// same-site player (its `ip` matches our own frontend address) gets a
    /// port from the Networker, deduped by pod; a foreign-site player's
    /// already-resolved port (carried in the event by the federation slave
    /// that forwarded it) is trusted as-is.
    async fn resolve_port(
        &self,
        pod: Option<&Pod>,
        ip: &str,
        event_port: Option<u16>,
    ) -> Result<Option<u16>, CoordError> {
        match pod {
            Some(pod) if ip == self.config.frontend_address => {
                Ok(Some(self.networker.create_network(pod).await?))
            }
            _ => Ok(event_port),
        }
    }

    async fn handle_message(&self, message: DiscoveryMessage) -> Result<(), CoordError> {
        match message {
            DiscoveryMessage::PlayerReady {
                game_id,
                player_id,
                pod,
                ip,
                port,
            } => {
                if self.registry.is_terminated(game_id).await {
                    tracing::warn!(%game_id, "PlayerReady for a completed game, rejecting");
                    return self
                        .publisher
                        .publish_for_game("GameProtocolError", game_id, topics::DISCOVERY)
                        .await;
                }
                if self.registry.state_of(game_id).await.is_none() {
                    self.registry.register_game(game_id).await?;
                }

                let pod = pod.map(Pod::from);
                let resolved_port = self.resolve_port(pod.as_ref(), &ip, port).await?;
                if let Some(pod) = &pod {
                    self.registry.record_pod_owner(pod.clone(), player_id).await;
                }

                let effects = self
                    .registry
                    .mark_player_ready(game_id, player_id, pod, Some(ip), resolved_port)
                    .await?;
                self.publisher.publish_all(effects).await
            }
            DiscoveryMessage::TcpCheckResult { game_id, success } => {
                let event = if success {
                    DiscoveryEvent::TcpCheckSucceeded
                } else {
                    DiscoveryEvent::TcpCheckFailed
                };
                let effects = self.registry.drive(game_id, event).await?;
                self.publisher.publish_all(effects).await
            }
            DiscoveryMessage::GameFinished { game_id, success } => {
                let event = if success {
                    DiscoveryEvent::GameFinishedWithSuccess
                } else {
                    DiscoveryEvent::GameFinishedWithError
                };
                let effects = self.registry.drive(game_id, event).await?;
                self.publisher.publish_all(effects).await?;
                let retire_effects = self.registry.retire_game(game_id).await?;
                self.publisher.publish_all(retire_effects).await
            }
        }
    }

    /// Slave-mode handling (§4.4.4): no local Game is created. A
    /// `PlayerReady` still gets its network allocation resolved locally
    /// (same-site pod, or trust a port already carried from further
    /// upstream in a federation chain) before the message — with that
    /// resolution folded in — is forwarded to the master unchanged in
    /// every other respect.
    async fn handle_message_as_slave(
        &self,
        wire_name: String,
        message: DiscoveryMessage,
    ) -> Result<(), CoordError> {
        let game_id = message.game_id();
        let forwarded = match message {
            DiscoveryMessage::PlayerReady {
                game_id,
                player_id,
                pod,
                ip,
                port,
            } => {
                let pod = pod.map(Pod::from);
                let resolved_port = self.resolve_port(pod.as_ref(), &ip, port).await?;
                if let Some(pod) = &pod {
                    self.registry.record_pod_owner(pod.clone(), player_id).await;
                }
                DiscoveryMessage::PlayerReady {
                    game_id,
                    player_id,
                    pod: pod.map(|p| p.0),
                    ip,
                    port: resolved_port,
                }
            }
            other => other,
        };

        let outbound = self.federation_outbound.as_ref().ok_or_else(|| {
            CoordError::fatal("slave mode requires a federation outbound channel")
        })?;
        let wire_event = ephemeral_wire::encode(&ephemeral_wire::DecodedWireEvent {
            name: wire_name,
            game_id: Some(game_id),
            player_id: None,
            payload: forwarded.encode(),
        });
        outbound
            .send(wire_event)
            .await
            .map_err(|_| CoordError::fatal("federation outbound channel closed"))
    }
}
