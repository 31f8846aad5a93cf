//! The Activation service (§4.5): runs one player's side of one MPC
//! activation per request — registers with Discovery, waits for the rest of
//! the game's players, proxies peer traffic, and drives the MPC runtime
//! binary to completion.

mod forwarder;
mod fsm;
mod http;
mod protocol;
mod runtime;
mod service;

pub use http::{build_router, AppState};
pub use service::{ActivationOutcome, ActivationRequest, PlayerCoordinator};
