//! The domain messages this activation exchanges with Discovery over the
//! wire transport's opaque payload. Wire-compatible with
//! `ephemeral-discovery`'s `PlayersPayload`, without depending on that
//! crate: both simply serialize `{ players: [PlayerDescriptor, ...] }`.

use ephemeral_core::{CoordError, GameId, PlayerDescriptor, PlayerId};
use serde::{Deserialize, Serialize};

/// The player list carried on a `PlayersReady` (or any other Discovery
/// broadcast) wire event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersPayload {
    /// Every player registered for this game at the moment the event fired.
    pub players: Vec<PlayerDescriptor>,
}

impl PlayersPayload {
    /// Decode a player list from a wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CoordError> {
        serde_json::from_slice(payload).map_err(CoordError::from)
    }
}

/// This activation's half of the Discovery client protocol. Wire-compatible
/// with `ephemeral-discovery`'s `DiscoveryMessage`, without depending on
/// that crate: each variant serializes to the same externally-tagged shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoveryRequest {
    /// This player has reached its rendezvous point.
    PlayerReady {
        /// The game being joined.
        game_id: GameId,
        /// This player's logical index.
        player_id: PlayerId,
        /// The compute pod hosting this player, if known.
        pod: Option<String>,
        /// The site address this player is registering from.
        ip: String,
    },
    /// The result of this site's peer connectivity check.
    TcpCheckResult {
        /// The game this result concerns.
        game_id: GameId,
        /// Whether every configured peer became reachable.
        success: bool,
    },
    /// The MPC runtime has exited for this game.
    GameFinished {
        /// The game that finished.
        game_id: GameId,
        /// Whether it exited successfully.
        success: bool,
    },
}

impl DiscoveryRequest {
    /// Encode this message into its wire payload.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::{Pod, PlayerId};

    #[test]
    fn decodes_a_players_ready_payload() {
        let payload = serde_json::to_vec(&PlayersPayload {
            players: vec![PlayerDescriptor {
                id: PlayerId(0),
                count: 2,
                ip: "192.168.0.1".to_string(),
                port: 30000,
                pod: Pod::from("pod1"),
            }],
        })
        .unwrap();
        let decoded = PlayersPayload::decode(&payload).unwrap();
        assert_eq!(decoded.players.len(), 1);
    }

    #[test]
    fn discovery_request_encodes_to_non_empty_json() {
        let msg = DiscoveryRequest::PlayerReady {
            game_id: GameId::new(),
            player_id: PlayerId(0),
            pod: None,
            ip: "10.0.0.1".to_string(),
        };
        assert!(!msg.encode().is_empty());
    }
}
