//! Translation between the generated [`proto::WireEvent`] and a plain,
//! already-unbiased representation the transport layer can fold into a bus
//! [`Event`](ephemeral_core::Event) once it knows the connection's topic
//! scope.

use crate::bias;
use crate::proto;
use ephemeral_core::{CoordError, GameId, PlayerId};

/// A `WireEvent` with its bias inverted and its `game_id` parsed, but not
/// yet routed to a topic — that decision belongs to the transport layer,
/// which knows the connection's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWireEvent {
    /// The event's name, e.g. `"PlayerReady"`.
    pub name: String,
    /// The game this event concerns, if any.
    pub game_id: Option<GameId>,
    /// The player this event concerns, if any, already unbiased.
    pub player_id: Option<PlayerId>,
    /// Opaque application payload.
    pub payload: Vec<u8>,
}

/// Decode a wire message, inverting its bias and parsing its `game_id`.
pub fn decode(msg: proto::WireEvent) -> Result<DecodedWireEvent, CoordError> {
    let game_id = if msg.game_id.is_empty() {
        None
    } else {
        Some(GameId::parse(&msg.game_id)?)
    };
    Ok(DecodedWireEvent {
        name: msg.name,
        game_id,
        player_id: bias::from_wire(msg.player_id)?,
        payload: msg.payload,
    })
}

/// Encode a decoded event back into its wire form, applying the bias.
pub fn encode(event: &DecodedWireEvent) -> proto::WireEvent {
    proto::WireEvent {
        name: event.name.clone(),
        game_id: event.game_id.map(|id| id.to_string()).unwrap_or_default(),
        player_id: bias::to_wire(event.player_id),
        payload: event.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_then_encode_is_lossless() {
        let game_id = GameId::new();
        let msg = proto::WireEvent {
            name: "PlayerReady".to_string(),
            game_id: game_id.to_string(),
            player_id: 101,
            payload: vec![9, 8, 7],
        };
        let decoded = decode(msg.clone()).unwrap();
        assert_eq!(decoded.player_id, Some(PlayerId(1)));
        assert_eq!(encode(&decoded), msg);
    }

    #[test]
    fn empty_game_id_decodes_to_none() {
        let msg = proto::WireEvent {
            name: "DiscoveryServiceStarted".to_string(),
            game_id: String::new(),
            player_id: 0,
            payload: Vec::new(),
        };
        let decoded = decode(msg).unwrap();
        assert_eq!(decoded.game_id, None);
        assert_eq!(decoded.player_id, None);
    }
}
