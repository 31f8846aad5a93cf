//! Discovery service (§4.4): one per-game coordinator FSM per game, gating
//! player registration, network allocation and the TCP connectivity check
//! before a game's MPC runtime starts, and retiring it afterwards.

pub mod federation;
pub mod fsm;
pub mod networker;
pub mod port_allocator;
pub mod protocol;
pub mod registry;
pub mod service;

pub use federation::FederationSlave;
pub use fsm::{DiscoveryEvent, DiscoveryState};
pub use networker::{LocalPortNetworker, Networker};
pub use port_allocator::PortAllocator;
pub use protocol::DiscoveryMessage;
pub use registry::{GameRegistry, PlayerRecord};
pub use service::DiscoveryService;
