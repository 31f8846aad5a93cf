//! The per-game coordinator FSM (§4.4.1): gates a game through player
//! registration, network allocation and the TCP connectivity check before
//! handing it off to the MPC runtime, and retires it afterwards.

use ephemeral_core::{topics, Event, FsmHandle, GameId};
use ephemeral_fsm::{Fsm, FsmBuilder, FsmState};
use std::time::Duration;

/// States a game's coordinator passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DiscoveryState {
    /// Registered but not all players have checked in yet.
    Init,
    /// Waiting for every player's `PlayerReady`.
    WaitPlayersReady,
    /// All players ready; waiting for the inter-player TCP check to pass.
    WaitTcpCheck,
    /// The MPC runtime is executing.
    Playing,
    /// A recoverable error occurred; the game will not proceed further.
    GameError,
    /// The game finished successfully.
    GameDone,
    /// Terminal state; the coordinator is retired and evicted from the
    /// registry.
    Stopped,
}

impl FsmState for DiscoveryState {
    fn stopped() -> Self {
        Self::Stopped
    }
}

/// Events the per-game coordinator responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DiscoveryEvent {
    /// A player registered (§4.4.2); fired once per distinct player.
    PlayerReady,
    /// Every expected player has registered.
    AllPlayersReady,
    /// `players_ready_timeout` elapsed before every player registered.
    PlayersReadyTimedOut,
    /// The inter-player TCP connectivity check passed for every pair.
    TcpCheckSucceeded,
    /// The inter-player TCP connectivity check failed.
    TcpCheckFailed,
    /// `tcp_check_timeout` elapsed before the check completed.
    TcpCheckTimedOut,
    /// The MPC runtime exited successfully.
    GameFinishedWithSuccess,
    /// The MPC runtime exited with an error, or any other fatal event for
    /// this game.
    GameFinishedWithError,
    /// Retire the coordinator regardless of its current state.
    Retire,
}

/// Build the transition table and callbacks for one game's coordinator, and
/// bind it to `game_id`.
///
/// State-entry callbacks only build the effect events to publish; the
/// engine is synchronous, so the actual `Publisher::publish_all` call is the
/// caller's job once `write` returns its effects.
pub fn build(game_id: GameId) -> Fsm<DiscoveryState, DiscoveryEvent> {
    let handle = FsmHandle::for_game(game_id);

    let on_enter = move |name: &'static str| {
        Box::new(move |_handle: &FsmHandle, _state: DiscoveryState, _event: DiscoveryEvent| {
            vec![Event::routed(
                name,
                Some(game_id),
                topics::game(game_id),
                vec![topics::DISCOVERY.to_string()],
            )]
        })
    };

    FsmBuilder::new(DiscoveryState::Init)
        .on(
            DiscoveryState::Init,
            DiscoveryEvent::PlayerReady,
            DiscoveryState::WaitPlayersReady,
        )
        .on(
            DiscoveryState::WaitPlayersReady,
            DiscoveryEvent::PlayerReady,
            DiscoveryState::WaitPlayersReady,
        )
        .on(
            DiscoveryState::WaitPlayersReady,
            DiscoveryEvent::AllPlayersReady,
            DiscoveryState::WaitTcpCheck,
        )
        .on(
            DiscoveryState::WaitPlayersReady,
            DiscoveryEvent::PlayersReadyTimedOut,
            DiscoveryState::GameError,
        )
        .on(
            DiscoveryState::WaitTcpCheck,
            DiscoveryEvent::TcpCheckSucceeded,
            DiscoveryState::Playing,
        )
        .on(
            DiscoveryState::WaitTcpCheck,
            DiscoveryEvent::TcpCheckFailed,
            DiscoveryState::GameError,
        )
        .on(
            DiscoveryState::WaitTcpCheck,
            DiscoveryEvent::TcpCheckTimedOut,
            DiscoveryState::GameError,
        )
        .on(
            DiscoveryState::Playing,
            DiscoveryEvent::GameFinishedWithSuccess,
            DiscoveryState::GameDone,
        )
        .on(
            DiscoveryState::Playing,
            DiscoveryEvent::GameFinishedWithError,
            DiscoveryState::GameError,
        )
        .on_any(DiscoveryEvent::Retire, DiscoveryState::Stopped)
        .after_enter(DiscoveryState::WaitTcpCheck, on_enter("AllPlayersReady"))
        .after_enter(DiscoveryState::Playing, on_enter("TCPCheckSuccess"))
        .after_enter(DiscoveryState::GameDone, on_enter("GameDone"))
        .after_enter(DiscoveryState::GameError, on_enter("GameError"))
        .on_timeout(
            DiscoveryState::WaitPlayersReady,
            Duration::from_secs(30),
            Box::new(move |_handle| Vec::new()),
        )
        .on_timeout(
            DiscoveryState::WaitTcpCheck,
            Duration::from_secs(30),
            Box::new(move |_handle| Vec::new()),
        )
        .build(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fsm() -> (GameId, Fsm<DiscoveryState, DiscoveryEvent>) {
        let game_id = GameId::new();
        (game_id, build(game_id))
    }

    #[test]
    fn happy_path_reaches_game_done() {
        let (_, mut fsm) = test_fsm();
        fsm.write(DiscoveryEvent::PlayerReady).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::WaitPlayersReady);
        fsm.write(DiscoveryEvent::AllPlayersReady).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::WaitTcpCheck);
        fsm.write(DiscoveryEvent::TcpCheckSucceeded).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::Playing);
        fsm.write(DiscoveryEvent::GameFinishedWithSuccess).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::GameDone);
    }

    #[test]
    fn tcp_check_failure_moves_to_game_error_not_stuck() {
        let (_, mut fsm) = test_fsm();
        fsm.write(DiscoveryEvent::PlayerReady).unwrap();
        fsm.write(DiscoveryEvent::AllPlayersReady).unwrap();
        fsm.write(DiscoveryEvent::TcpCheckFailed).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::GameError);
    }

    #[test]
    fn retire_is_reachable_from_any_state() {
        let (_, mut fsm) = test_fsm();
        fsm.write(DiscoveryEvent::Retire).unwrap();
        assert!(fsm.is_stopped());
    }

    #[test]
    fn repeated_player_ready_does_not_leave_wait_players_ready() {
        let (_, mut fsm) = test_fsm();
        fsm.write(DiscoveryEvent::PlayerReady).unwrap();
        fsm.write(DiscoveryEvent::PlayerReady).unwrap();
        assert_eq!(fsm.current(), DiscoveryState::WaitPlayersReady);
    }
}
