//! Generic FSM runtime (§4.1) shared by the Discovery per-game coordinator
//! and the Activation per-player coordinator. The engine itself knows
//! nothing about games or players: each caller supplies its own `State` and
//! `EventKind` types and gets a transition table, callback hooks, a
//! follow-up event queue, and a history log in return.

mod machine;

pub use machine::{Fsm, FsmBuilder, FsmEventKind, FsmState, HistoryEntry};
