//! Bidirectional gRPC streaming transport (§4.3): one stream per
//! connection, scoped by `x-conn-id`/`x-event-scope` request metadata and
//! bridged to the event bus.

mod client;
mod conn;
mod server;

pub use client::TransportClient;
pub use conn::{read_connection_metadata, write_connection_metadata, ConnId, Scope};
pub use server::TransportServer;
