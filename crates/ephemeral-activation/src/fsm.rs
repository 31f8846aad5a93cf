//! The per-activation player coordinator FSM (§4.5.1): drives one player's
//! registration, MPC runtime execution and teardown for a single game.

use crate::protocol::DiscoveryRequest;
use ephemeral_core::{topics, Event, FsmHandle, GameId, Pod, PlayerId};
use ephemeral_fsm::{Fsm, FsmBuilder, FsmState};
use std::time::Duration;

/// States a player's activation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PlayerState {
    /// Freshly constructed; about to send itself `Register`.
    Init,
    /// Waiting for every player in the game to register.
    Registering,
    /// The MPC runtime is executing.
    Playing,
    /// The runtime exited successfully.
    PlayerFinishedWithSuccess,
    /// The runtime exited with an error, or a recoverable failure occurred.
    PlayerFinishedWithError,
    /// Terminal state; the surrounding service has been notified.
    PlayerDone,
}

impl FsmState for PlayerState {
    fn stopped() -> Self {
        Self::PlayerDone
    }
}

/// Events the player FSM responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PlayerEvent {
    /// Self-sent on construction; begins the registration handshake.
    Register,
    /// Every player in the game has registered with Discovery.
    PlayersReady,
    /// The MPC runtime exited successfully.
    PlayerFinishedWithSuccess,
    /// Discovery reported a game-level failure.
    GameError,
    /// The MPC runtime driver (proxy start, peer liveness, subprocess exit)
    /// failed.
    PlayingError,
    /// The state timer elapsed before the next expected transition.
    StateTimeoutError,
    /// Retire the FSM regardless of its current state.
    PlayerDone,
}

/// Build the transition table and callbacks for one activation, bound to
/// `game_id` and this site's `self_id`/`pod`/`ip`. Mirrors the Discovery
/// coordinator's shape: callbacks only build effect events, never publish
/// directly.
pub fn build(game_id: GameId, self_id: PlayerId, pod: Option<Pod>, ip: String) -> Fsm<PlayerState, PlayerEvent> {
    let handle = FsmHandle::for_player();
    let register_payload = DiscoveryRequest::PlayerReady {
        game_id,
        player_id: self_id,
        pod: pod.map(|p| p.0),
        ip,
    };

    FsmBuilder::new(PlayerState::Init)
        .on(PlayerState::Init, PlayerEvent::Register, PlayerState::Registering)
        .on(
            PlayerState::Registering,
            PlayerEvent::PlayersReady,
            PlayerState::Playing,
        )
        .on(
            PlayerState::Playing,
            PlayerEvent::PlayerFinishedWithSuccess,
            PlayerState::PlayerFinishedWithSuccess,
        )
        .on_any(PlayerEvent::GameError, PlayerState::PlayerFinishedWithError)
        .on_any(PlayerEvent::PlayingError, PlayerState::PlayerFinishedWithError)
        .on_any(
            PlayerEvent::StateTimeoutError,
            PlayerState::PlayerFinishedWithError,
        )
        .on_any(PlayerEvent::PlayerDone, PlayerState::PlayerDone)
        .after_enter(
            PlayerState::Registering,
            Box::new(move |_handle, _state, _event| {
                vec![Event::from_wire(
                    "PlayerReady",
                    Some(game_id),
                    register_payload.encode(),
                    topics::DISCOVERY,
                    vec![topics::PLAYER_SELF.to_string()],
                )]
            }),
        )
        .after_enter(
            PlayerState::PlayerFinishedWithError,
            Box::new(move |_handle, _state, _event| {
                let payload = DiscoveryRequest::GameFinished {
                    game_id,
                    success: false,
                }
                .encode();
                vec![
                    Event::from_wire(
                        "GameFinishedWithError",
                        Some(game_id),
                        payload,
                        topics::DISCOVERY,
                        vec![topics::PLAYER_SELF.to_string()],
                    ),
                    Event::routed(
                        "PlayerDone",
                        Some(game_id),
                        topics::PLAYER_SELF.to_string(),
                        vec![topics::PLAYER_SELF.to_string()],
                    ),
                ]
            }),
        )
        .after_enter(
            PlayerState::PlayerFinishedWithSuccess,
            Box::new(move |_handle, _state, _event| {
                let payload = DiscoveryRequest::GameFinished {
                    game_id,
                    success: true,
                }
                .encode();
                vec![
                    Event::from_wire(
                        "GameFinishedWithSuccess",
                        Some(game_id),
                        payload,
                        topics::DISCOVERY,
                        vec![topics::PLAYER_SELF.to_string()],
                    ),
                    Event::routed(
                        "PlayerDone",
                        Some(game_id),
                        topics::PLAYER_SELF.to_string(),
                        vec![topics::PLAYER_SELF.to_string()],
                    ),
                ]
            }),
        )
        .on_timeout(
            PlayerState::Registering,
            Duration::from_secs(30),
            Box::new(move |_handle| Vec::new()),
        )
        .on_timeout(
            PlayerState::Playing,
            Duration::from_secs(30),
            Box::new(move |_handle| Vec::new()),
        )
        .build(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fsm() -> Fsm<PlayerState, PlayerEvent> {
        build(GameId::new(), PlayerId(0), None, "10.0.0.1".to_string())
    }

    #[test]
    fn happy_path_reaches_player_finished_with_success() {
        let mut fsm = test_fsm();
        fsm.write(PlayerEvent::Register).unwrap();
        assert_eq!(fsm.current(), PlayerState::Registering);
        fsm.write(PlayerEvent::PlayersReady).unwrap();
        assert_eq!(fsm.current(), PlayerState::Playing);
        fsm.write(PlayerEvent::PlayerFinishedWithSuccess).unwrap();
        assert_eq!(fsm.current(), PlayerState::PlayerFinishedWithSuccess);
    }

    #[test]
    fn game_error_is_reachable_from_any_state() {
        let mut fsm = test_fsm();
        fsm.write(PlayerEvent::GameError).unwrap();
        assert_eq!(fsm.current(), PlayerState::PlayerFinishedWithError);
    }

    #[test]
    fn player_done_stops_the_machine() {
        let mut fsm = test_fsm();
        fsm.write(PlayerEvent::PlayerDone).unwrap();
        assert!(fsm.is_stopped());
    }

    #[test]
    fn playing_error_terminates_mid_computation() {
        let mut fsm = test_fsm();
        fsm.write(PlayerEvent::Register).unwrap();
        fsm.write(PlayerEvent::PlayersReady).unwrap();
        fsm.write(PlayerEvent::PlayingError).unwrap();
        assert_eq!(fsm.current(), PlayerState::PlayerFinishedWithError);
    }
}
