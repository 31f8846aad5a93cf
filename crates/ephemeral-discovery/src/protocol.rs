//! The domain messages Discovery exchanges with clients over the wire
//! transport's opaque payload (§4.4.2–§4.4.4). The transport layer and the
//! wire codec know nothing about these shapes; they only see bytes.

use ephemeral_core::{GameId, PlayerDescriptor, PlayerId};
use serde::{Deserialize, Serialize};

/// One message in the Discovery client protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoveryMessage {
    /// A player has reached its rendezvous point and is ready to play.
    PlayerReady {
        /// The game this player is joining.
        game_id: GameId,
        /// The player's logical index.
        player_id: PlayerId,
        /// The compute pod hosting this player, if known.
        pod: Option<String>,
        /// The site address this player is registering from.
        ip: String,
        /// The player's already-allocated port, carried by a federation
        /// slave forwarding this message upstream so the master can trust
        /// a foreign site's allocation instead of making its own (§4.4.2).
        /// `None` when the originating site has not yet resolved a port.
        port: Option<u16>,
    },
    /// The result of the inter-player TCP connectivity check.
    TcpCheckResult {
        /// The game this result concerns.
        game_id: GameId,
        /// Whether every pair of players could reach each other.
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

impl DiscoveryMessage {
    /// Decode a message from its wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self, ephemeral_core::CoordError> {
        serde_json::from_slice(payload).map_err(ephemeral_core::CoordError::from)
    }

    /// Encode this message into its wire payload.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// The game this message concerns, common to every variant.
    pub fn game_id(&self) -> GameId {
        match self {
            Self::PlayerReady { game_id, .. }
            | Self::TcpCheckResult { game_id, .. }
            | Self::GameFinished { game_id, .. } => *game_id,
        }
    }
}

/// The body of an outgoing (Discovery-to-client) wire event: the player
/// list for this game at the moment the event was raised (§4.4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersPayload {
    /// Every player registered for this game so far.
    pub players: Vec<PlayerDescriptor>,
}

impl PlayersPayload {
    /// Encode the player list into a wire payload.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ready_round_trips_through_its_wire_payload() {
        let msg = DiscoveryMessage::PlayerReady {
            game_id: GameId::new(),
            player_id: PlayerId(2),
            pod: Some("pod-a".to_string()),
            ip: "192.168.0.1".to_string(),
            port: None,
        };
        let decoded = DiscoveryMessage::decode(&msg.encode()).unwrap();
        match decoded {
            DiscoveryMessage::PlayerReady { player_id, .. } => assert_eq!(player_id, PlayerId(2)),
            _ => panic!("wrong variant"),
        }
    }
}
