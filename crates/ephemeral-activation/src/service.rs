//! Wires the player FSM, the forwarder, the streaming transport to
//! Discovery and the MPC runtime driver together into one activation run
//! (§4.5). One `PlayerCoordinator` serves exactly one HTTP activation
//! request: a fresh FSM, a fresh player-local bus and a fresh connection to
//! Discovery are built per call, mirroring the one-player-per-process shape
//! of the Activation service.

use crate::fsm::{self, PlayerEvent, PlayerState};
use crate::protocol::{DiscoveryRequest, PlayersPayload};
use crate::runtime;
use ephemeral_bus::EventBus;
use ephemeral_core::{topics, ActivationConfig, CoordError, Event, GameId, Pod, PlayerId};
use ephemeral_transport::{ConnId, Scope, TransportClient};
use ephemeral_wire::proto::WireEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the caller asked this activation to compute.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    /// The game this activation joins.
    pub game_id: GameId,
    /// The MPC program to run, already staged on disk by the caller.
    pub program_path: std::path::PathBuf,
}

/// What came out of a completed activation.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    /// Whether the MPC runtime reported success.
    pub success: bool,
}

/// Drives one player's activation end to end.
pub struct PlayerCoordinator {
    config: ActivationConfig,
    self_id: PlayerId,
    pod: Option<Pod>,
    ip: String,
}

impl PlayerCoordinator {
    /// Build a coordinator for this site.
    pub fn new(config: ActivationConfig, pod: Option<Pod>, ip: String) -> Self {
        let self_id = PlayerId(config.player_id);
        Self {
            config,
            self_id,
            pod,
            ip,
        }
    }

    /// Run one activation to completion: register with Discovery, wait for
    /// the rest of the game's players, run the peer connectivity check and
    /// the MPC runtime, and report the outcome back upstream.
    pub async fn run(&self, request: ActivationRequest) -> Result<ActivationOutcome, CoordError> {
        let bus = EventBus::new(256);
        let shutdown = CancellationToken::new();

        let conn_id = ConnId(format!("activation-{}", request.game_id));
        let client = TransportClient::connect(
            self.config.discovery_address.clone(),
            conn_id,
            Scope::SelfOnly,
        )
        .await?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<WireEvent>(64);
        let forwarder = crate::forwarder::Forwarder::new(bus.clone());
        let forwarder_shutdown = shutdown.clone();
        let forwarder_task = tokio::spawn(async move { forwarder.run(outbound_tx, forwarder_shutdown).await });

        let client_bus = bus.clone();
        let client_shutdown = shutdown.clone();
        let client_task = tokio::spawn(async move {
            if let Err(err) = client
                .run(
                    outbound_rx,
                    client_bus,
                    topics::PLAYER_SELF.to_string(),
                    client_shutdown,
                )
                .await
            {
                tracing::warn!(%err, "transport client to discovery exited with error");
            }
        });

        let outcome = self.drive(&bus, &request).await;

        shutdown.cancel();
        let _ = forwarder_task.await;
        let _ = client_task.await;
        outcome
    }

    async fn drive(
        &self,
        bus: &EventBus,
        request: &ActivationRequest,
    ) -> Result<ActivationOutcome, CoordError> {
        let game_id = request.game_id;
        let mut player_fsm = fsm::build(game_id, self.self_id, self.pod.clone(), self.ip.clone());
        let mut self_events = bus.subscribe(topics::PLAYER_SELF).await;

        let effects = player_fsm.write(PlayerEvent::Register)?;
        Self::publish_all(bus, effects).await?;

        loop {
            let event = self_events
                .recv()
                .await
                .map_err(|err| CoordError::peer(format!("player bus closed: {err}")))?;

            match event.name.as_str() {
                "AllPlayersReady" => {
                    let players = event
                        .meta
                        .wire_payload()
                        .map(PlayersPayload::decode)
                        .transpose()?
                        .map(|p| p.players)
                        .unwrap_or_default();

                    let effects = player_fsm.write(PlayerEvent::PlayersReady)?;
                    Self::publish_all(bus, effects).await?;

                    let result = self.run_computation(bus, game_id, &players, request).await;
                    let final_effects = match result {
                        Ok(()) => player_fsm.write(PlayerEvent::PlayerFinishedWithSuccess)?,
                        Err(err) => {
                            tracing::warn!(%err, game_id = %game_id, "activation computation failed");
                            player_fsm.write(PlayerEvent::PlayingError)?
                        }
                    };
                    Self::publish_all(bus, final_effects).await?;
                }
                "GameError" if event.game_id == Some(game_id) => {
                    let effects = player_fsm.write(PlayerEvent::GameError)?;
                    Self::publish_all(bus, effects).await?;
                }
                "PlayerDone" => {
                    let effects = player_fsm.write(PlayerEvent::PlayerDone)?;
                    Self::publish_all(bus, effects).await?;
                    break;
                }
                _ => {}
            }
        }

        let success = matches!(player_fsm.current(), PlayerState::PlayerFinishedWithSuccess);
        Ok(ActivationOutcome { success })
    }

    async fn run_computation(
        &self,
        bus: &EventBus,
        game_id: GameId,
        players: &[ephemeral_core::PlayerDescriptor],
        request: &ActivationRequest,
    ) -> Result<(), CoordError> {
        let routes = runtime::build_routes(self.self_id, players, self.config.peer_base_port())?;

        let proxy_shutdown = CancellationToken::new();
        for route in &routes {
            let route = route.clone();
            let shutdown = proxy_shutdown.clone();
            tokio::spawn(async move {
                if let Err(err) = runtime::start_proxy_listener(route, shutdown).await {
                    tracing::warn!(%err, "proxy listener exited with error");
                }
            });
        }

        let result = self.run_computation_inner(bus, game_id, players, &routes, request).await;
        proxy_shutdown.cancel();
        result
    }

    async fn run_computation_inner(
        &self,
        bus: &EventBus,
        game_id: GameId,
        players: &[ephemeral_core::PlayerDescriptor],
        routes: &[runtime::ProxyRoute],
        request: &ActivationRequest,
    ) -> Result<(), CoordError> {
        runtime::probe_own_listeners(routes, Duration::from_secs(2)).await?;

        let dial_timeout = Duration::from_secs(2);
        let retry_timeout = self.config.peer_connect_timeout.0;
        let retry_sleep = Duration::from_millis(200);
        runtime::peer_liveness_check(self.self_id, players, dial_timeout, retry_timeout, retry_sleep).await?;

        let tcp_check_payload = DiscoveryRequest::TcpCheckResult {
            game_id,
            success: true,
        }
        .encode();
        bus.publish(Event::from_wire(
            "TcpCheckResult",
            Some(game_id),
            tcp_check_payload,
            topics::DISCOVERY,
            vec![topics::PLAYER_SELF.to_string()],
        ))
        .await?;

        runtime::run_mpc_runtime(&self.config, self.self_id, players.len() as u32, &request.program_path).await
    }

    async fn publish_all(bus: &EventBus, events: Vec<Event>) -> Result<(), CoordError> {
        for event in events {
            bus.publish(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::{ConfigDuration, SpdzParameters, TupleStoreConfig};
    use std::collections::HashMap;

    fn test_config() -> ActivationConfig {
        ActivationConfig {
            player_id: 0,
            http_address: "127.0.0.1:0".to_string(),
            discovery_address: "http://127.0.0.1:1".to_string(),
            mpc_runtime_path: "/bin/true".to_string(),
            spdz: SpdzParameters {
                prime: "7".to_string(),
                r_inv: "1".to_string(),
                mac_keys: HashMap::new(),
            },
            tuple_store: TupleStoreConfig {
                endpoint: "http://127.0.0.1:1".to_string(),
                batch_size: 1,
            },
            peer_connect_timeout: ConfigDuration::from_duration(Duration::from_secs(1)),
            runtime_exit_timeout: ConfigDuration::from_duration(Duration::from_secs(1)),
            peer_proxy_base_port: 40000,
        }
    }

    #[test]
    fn coordinator_captures_this_sites_player_id() {
        let coordinator = PlayerCoordinator::new(test_config(), None, "10.0.0.1".to_string());
        assert_eq!(coordinator.self_id, PlayerId(0));
    }
}
