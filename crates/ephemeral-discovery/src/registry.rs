//! Per-game registry (§4.4.2–§4.4.4): tracks which players have checked in
//! for a game, drives that game's coordinator FSM, and records its network
//! allocation. One [`GameEntry`] exists per game for the lifetime between
//! its first `PlayerReady` and its retirement.

use crate::fsm::{self, DiscoveryEvent, DiscoveryState};
use ephemeral_core::{CoordError, Event, GameId, PlayerDescriptor, PlayerId, Pod};
use ephemeral_fsm::Fsm;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One player's registration record for a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// The player's logical index.
    pub player_id: PlayerId,
    /// The compute pod hosting this player's MPC runtime, once known.
    pub pod: Option<Pod>,
    /// The site address this player registered from.
    pub ip: Option<String>,
    /// This player's allocated network port, resolved at registration time.
    pub port: Option<u16>,
}

/// One game's live coordinator state.
pub struct GameEntry {
    fsm: Fsm<DiscoveryState, DiscoveryEvent>,
    players: HashMap<PlayerId, PlayerRecord>,
    expected_player_count: u32,
}

impl GameEntry {
    /// The coordinator's current state.
    pub fn state(&self) -> DiscoveryState {
        self.fsm.current()
    }

    /// Players registered so far.
    pub fn players(&self) -> &HashMap<PlayerId, PlayerRecord> {
        &self.players
    }
}

/// Registry of every game the Discovery service is currently coordinating.
///
/// Also tracks two pieces of state that outlive any single game: the set of
/// identifiers already retired (so a replayed `PlayerReady` for a completed
/// game is rejected rather than silently starting a new one, §4.4.2) and the
/// `pod → playerID` ownership table the Networker's pod-deletion channel
/// needs to erase on eviction (§4.4.5).
#[derive(Clone)]
pub struct GameRegistry {
    games: Arc<RwLock<HashMap<GameId, GameEntry>>>,
    terminated: Arc<RwLock<HashSet<GameId>>>,
    pod_owners: Arc<RwLock<HashMap<Pod, PlayerId>>>,
    expected_player_count: u32,
}

impl GameRegistry {
    /// Create a registry expecting `expected_player_count` players per game.
    pub fn new(expected_player_count: u32) -> Self {
        Self {
            games: Arc::new(RwLock::new(HashMap::new())),
            terminated: Arc::new(RwLock::new(HashSet::new())),
            pod_owners: Arc::new(RwLock::new(HashMap::new())),
            expected_player_count,
        }
    }

    /// Register a fresh game. Reusing a game identifier already active in
    /// this registry is a protocol error; reuse of a *completed* identifier
    /// is instead caught by [`GameRegistry::is_terminated`] before this is
    /// ever called (§7: "reuse of a completed game identifier").
    pub async fn register_game(&self, game_id: GameId) -> Result<(), CoordError> {
        let mut games = self.games.write().await;
        if games.contains_key(&game_id) {
            return Err(CoordError::protocol(format!(
                "game {game_id} is already registered"
            )));
        }
        games.insert(
            game_id,
            GameEntry {
                fsm: fsm::build(game_id),
                players: HashMap::new(),
                expected_player_count: self.expected_player_count,
            },
        );
        Ok(())
    }

    /// Whether `game_id` has already been retired. A replayed `PlayerReady`
    /// for a terminated game identifier is a protocol error, not a fresh
    /// registration (§4.4.2, §8 "Completed-game replay").
    pub async fn is_terminated(&self, game_id: GameId) -> bool {
        self.terminated.read().await.contains(&game_id)
    }

    /// Record that `pod` is hosting `player_id`, so the Networker's
    /// pod-deletion channel can be resolved back to a player record.
    pub async fn record_pod_owner(&self, pod: Pod, player_id: PlayerId) {
        self.pod_owners.write().await.insert(pod, player_id);
    }

    /// Forget a pod's ownership, on the Networker reporting it deleted.
    pub async fn forget_pod(&self, pod: &Pod) {
        self.pod_owners.write().await.remove(pod);
    }

    /// Record a player's `PlayerReady`, idempotently. A duplicate from a
    /// reconnecting client is logged and otherwise ignored rather than
    /// re-counted or re-driving the FSM a second time. `port` is the
    /// already-resolved network port for this player (§4.4.2): allocated
    /// locally for same-site players, trusted from the wire event for
    /// foreign-site ones.
    pub async fn mark_player_ready(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        pod: Option<Pod>,
        ip: Option<String>,
        port: Option<u16>,
    ) -> Result<Vec<Event>, CoordError> {
        let mut games = self.games.write().await;
        let entry = games
            .get_mut(&game_id)
            .ok_or_else(|| CoordError::protocol(format!("unknown game {game_id}")))?;

        if entry.players.contains_key(&player_id) {
            tracing::debug!(%game_id, %player_id, "duplicate PlayerReady, ignoring");
            return Ok(Vec::new());
        }

        entry.players.insert(
            player_id,
            PlayerRecord {
                player_id,
                pod,
                ip,
                port,
            },
        );

        let mut effects = entry.fsm.write(DiscoveryEvent::PlayerReady)?;

        if entry.players.len() as u32 >= entry.expected_player_count {
            effects.extend(entry.fsm.write(DiscoveryEvent::AllPlayersReady)?);
        }
        Ok(effects)
    }

    /// The player list as it should be attached to outgoing wire events
    /// (§4.4.3): every registered player's descriptor, in arbitrary order.
    pub async fn players_snapshot(&self, game_id: GameId) -> Vec<PlayerDescriptor> {
        let games = self.games.read().await;
        let Some(entry) = games.get(&game_id) else {
            return Vec::new();
        };
        let count = entry.expected_player_count;
        entry
            .players
            .values()
            .map(|record| PlayerDescriptor {
                id: record.player_id,
                count,
                ip: record.ip.clone().unwrap_or_default(),
                port: record.port.unwrap_or_default(),
                pod: record.pod.clone().unwrap_or_else(|| Pod::from("")),
            })
            .collect()
    }

    /// Drive a game's coordinator with an externally-observed event (TCP
    /// check result, runtime exit, ...).
    pub async fn drive(&self, game_id: GameId, event: DiscoveryEvent) -> Result<Vec<Event>, CoordError> {
        let mut games = self.games.write().await;
        let entry = games
            .get_mut(&game_id)
            .ok_or_else(|| CoordError::protocol(format!("unknown game {game_id}")))?;
        entry.fsm.write(event)
    }

    /// Retire a game: drive it to `Stopped`, evict it from the registry, and
    /// record its identifier as terminated so a later replay of its
    /// `gameID` is rejected rather than starting a new game (§4.4.2).
    /// Returns the FSM's final effects, if the game was still known.
    pub async fn retire_game(&self, game_id: GameId) -> Result<Vec<Event>, CoordError> {
        let mut games = self.games.write().await;
        let Some(mut entry) = games.remove(&game_id) else {
            return Ok(Vec::new());
        };
        drop(games);
        self.terminated.write().await.insert(game_id);
        entry.fsm.write(DiscoveryEvent::Retire)
    }

    /// Read-only snapshot of a game's state, for diagnostics and tests.
    pub async fn state_of(&self, game_id: GameId) -> Option<DiscoveryState> {
        self.games.read().await.get(&game_id).map(GameEntry::state)
    }

    /// Number of games currently tracked.
    pub async fn active_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Every port currently attached to a player record across every active
    /// game, for the Networker's periodic re-sync (§4.4.5).
    pub async fn allocated_ports(&self) -> Vec<u16> {
        self.games
            .read()
            .await
            .values()
            .flat_map(|entry| entry.players.values().filter_map(|record| record.port))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registering_the_same_game_twice_is_a_protocol_error() {
        let registry = GameRegistry::new(2);
        let game_id = GameId::new();
        registry.register_game(game_id).await.unwrap();
        let err = registry.register_game(game_id).await.unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[tokio::test]
    async fn all_players_ready_fires_once_expected_count_reached() {
        let registry = GameRegistry::new(2);
        let game_id = GameId::new();
        registry.register_game(game_id).await.unwrap();

        registry
            .mark_player_ready(game_id, PlayerId(0), None, None, None)
            .await
            .unwrap();
        assert_eq!(
            registry.state_of(game_id).await,
            Some(DiscoveryState::WaitPlayersReady)
        );

        registry
            .mark_player_ready(game_id, PlayerId(1), None, None, None)
            .await
            .unwrap();
        assert_eq!(
            registry.state_of(game_id).await,
            Some(DiscoveryState::WaitTcpCheck)
        );
    }

    #[tokio::test]
    async fn duplicate_player_ready_does_not_retrigger_the_transition() {
        let registry = GameRegistry::new(3);
        let game_id = GameId::new();
        registry.register_game(game_id).await.unwrap();

        registry
            .mark_player_ready(game_id, PlayerId(0), None, None, None)
            .await
            .unwrap();
        registry
            .mark_player_ready(game_id, PlayerId(0), None, None, None)
            .await
            .unwrap();

        let games = registry.games.read().await;
        let entry = games.get(&game_id).unwrap();
        assert_eq!(entry.players.len(), 1);
    }

    #[tokio::test]
    async fn retiring_an_unknown_game_is_a_no_op() {
        let registry = GameRegistry::new(2);
        let effects = registry.retire_game(GameId::new()).await.unwrap();
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn retiring_a_game_marks_its_identifier_terminated() {
        let registry = GameRegistry::new(2);
        let game_id = GameId::new();
        registry.register_game(game_id).await.unwrap();
        assert!(!registry.is_terminated(game_id).await);
        registry.retire_game(game_id).await.unwrap();
        assert!(registry.is_terminated(game_id).await);
    }

    #[tokio::test]
    async fn pod_ownership_is_recorded_and_can_be_forgotten() {
        let registry = GameRegistry::new(2);
        let pod = Pod::from("pod-a");
        registry.record_pod_owner(pod.clone(), PlayerId(0)).await;
        assert!(registry.pod_owners.read().await.contains_key(&pod));
        registry.forget_pod(&pod).await;
        assert!(!registry.pod_owners.read().await.contains_key(&pod));
    }
}
