//! The bus-level `Event` envelope (§3) and its metadata.
//!
//! `meta` is a tagged variant rather than a single struct of `Option`s (§9,
//! "Dynamic event metadata") — each code path that reads metadata documents,
//! via the variant it matches on, which fields it actually needs. Events are
//! immutable once constructed; nothing here mutates an `Event` in place.

use crate::ids::GameId;
use serde::{Deserialize, Serialize};

/// Opaque handle back to the FSM that should receive a follow-up event.
///
/// Resolves the cyclic-ownership problem noted in §9: rather than an event
/// holding a live reference to its FSM, it holds a small key that the owning
/// service (Discovery or Activation) uses to look the FSM back up in its own
/// arena (a `HashMap<GameId, _>` on the Discovery side, a single slot on the
/// Activation side).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FsmHandle(pub String);

impl FsmHandle {
    /// Handle for a Discovery-side per-game FSM.
    pub fn for_game(game_id: GameId) -> Self {
        Self(game_id.to_string())
    }

    /// Handle for the (always singular) Activation-side per-player FSM.
    pub fn for_player() -> Self {
        Self("self".to_string())
    }
}

/// Event metadata: which topic(s) it came from and is bound for, and — for
/// wire-originated or FSM-directed events — the extra payload each of those
/// cases needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventMeta {
    /// A plain routed event: published to `target_topic`, optionally in
    /// response to events observed on `source_topics`.
    Routed {
        /// The topic this event was published to.
        target_topic: String,
        /// Topics whose events prompted this publish, if any.
        source_topics: Vec<String>,
    },
    /// An event destined for (or raised by) an FSM; carries a handle so a
    /// callback can enqueue follow-up events without borrowing the FSM.
    Fsm {
        /// Handle to the FSM this event concerns.
        handle: FsmHandle,
        /// The topic this event was published to.
        target_topic: String,
        /// Topics whose events prompted this publish, if any.
        source_topics: Vec<String>,
    },
    /// An event translated from a wire-level `WireEvent`; the original
    /// encoded payload is preserved verbatim so a later translation step
    /// (e.g. the Activation forwarder) can re-emit it without re-encoding.
    Wire {
        /// The original transport-level message, preserved across translation.
        payload: Vec<u8>,
        /// The topic this event was published to.
        target_topic: String,
        /// Topics whose events prompted this publish, if any.
        source_topics: Vec<String>,
    },
}

impl EventMeta {
    /// The topic this event targets, common to every variant.
    pub fn target_topic(&self) -> &str {
        match self {
            Self::Routed { target_topic, .. }
            | Self::Fsm { target_topic, .. }
            | Self::Wire { target_topic, .. } => target_topic,
        }
    }

    /// The topics this event was sourced from, common to every variant.
    pub fn source_topics(&self) -> &[String] {
        match self {
            Self::Routed { source_topics, .. }
            | Self::Fsm { source_topics, .. }
            | Self::Wire { source_topics, .. } => source_topics,
        }
    }

    /// The FSM handle, if this event carries one.
    pub fn fsm_handle(&self) -> Option<&FsmHandle> {
        match self {
            Self::Fsm { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// The preserved wire payload, if this event carries one.
    pub fn wire_payload(&self) -> Option<&[u8]> {
        match self {
            Self::Wire { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// An immutable event flowing through the bus (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The event's name, e.g. `"PlayerReady"` or `"GameDone"`.
    pub name: String,
    /// The game this event concerns, if any (service-level events such as
    /// `DiscoveryServiceStarted` have none).
    pub game_id: Option<GameId>,
    /// Routing and payload metadata.
    pub meta: EventMeta,
}

impl Event {
    /// Construct a routed event with no FSM handle or wire payload.
    pub fn routed(
        name: impl Into<String>,
        game_id: Option<GameId>,
        target_topic: impl Into<String>,
        source_topics: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            game_id,
            meta: EventMeta::Routed {
                target_topic: target_topic.into(),
                source_topics,
            },
        }
    }

    /// Construct an event directed at a specific FSM.
    pub fn for_fsm(
        name: impl Into<String>,
        game_id: Option<GameId>,
        handle: FsmHandle,
        target_topic: impl Into<String>,
        source_topics: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            game_id,
            meta: EventMeta::Fsm {
                handle,
                target_topic: target_topic.into(),
                source_topics,
            },
        }
    }

    /// Construct an event translated from a wire-level message.
    pub fn from_wire(
        name: impl Into<String>,
        game_id: Option<GameId>,
        payload: Vec<u8>,
        target_topic: impl Into<String>,
        source_topics: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            game_id,
            meta: EventMeta::Wire {
                payload,
                target_topic: target_topic.into(),
                source_topics,
            },
        }
    }
}

/// Reserved topic names (§4.2).
pub mod topics {
    /// Service-level lifecycle events (e.g. `DiscoveryServiceStarted`).
    pub const SERVICE_EVENTS: &str = "serviceEvents";
    /// FSM events bound for the Discovery per-game coordinator logic.
    pub const DISCOVERY: &str = "discovery";
    /// Wire events arriving from clients, before per-game routing.
    pub const CLIENT_INCOMING_EVENTS: &str = "clientIncomingEvents";
    /// Wire events about to be broadcast out to clients.
    pub const CLIENT_OUTGOING_EVENTS: &str = "clientOutgoingEvents";
    /// Events a federation slave forwards upstream to the master.
    pub const MASTER_OUTGOING_EVENTS: &str = "masterOutgoingEvents";
    /// The broadcast fan-out topic every transport stream subscribes to.
    pub const BROADCAST: &str = "broadcast";
    /// An activation's own player-local topic: its FSM's terminal events
    /// and the forwarder both publish and subscribe here. One Activation
    /// process hosts exactly one player, so this needs no further keying.
    pub const PLAYER_SELF: &str = "playerSelf";

    /// Per-game topic name.
    pub fn game(game_id: crate::ids::GameId) -> String {
        game_id.to_string()
    }

    /// Per-player topic name.
    pub fn player(player_id: crate::ids::PlayerId) -> String {
        format!("player-{}", player_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_accessors_agree_across_variants() {
        let routed = Event::routed("Registered", None, topics::DISCOVERY, vec![]);
        assert_eq!(routed.meta.target_topic(), topics::DISCOVERY);
        assert!(routed.meta.fsm_handle().is_none());
        assert!(routed.meta.wire_payload().is_none());

        let game_id = GameId::new();
        let fsm_evt = Event::for_fsm(
            "PlayerReady",
            Some(game_id),
            FsmHandle::for_game(game_id),
            topics::game(game_id),
            vec![topics::CLIENT_INCOMING_EVENTS.to_string()],
        );
        assert_eq!(fsm_evt.meta.fsm_handle(), Some(&FsmHandle::for_game(game_id)));

        let wire_evt = Event::from_wire(
            "PlayersReady",
            Some(game_id),
            vec![1, 2, 3],
            topics::CLIENT_OUTGOING_EVENTS,
            vec![],
        );
        assert_eq!(wire_evt.meta.wire_payload(), Some(&[1u8, 2, 3][..]));
    }
}
