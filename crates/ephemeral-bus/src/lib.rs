//! Named-topic event bus and publisher (§4.2).
//!
//! The bus itself is a thin registry of `tokio::sync::broadcast` channels
//! keyed by topic name; `Publisher` spells out the handful of publish shapes
//! the rest of the coordination plane uses so call sites don't build
//! `Event`s by hand.

mod bus;
mod publisher;

pub use bus::EventBus;
pub use publisher::Publisher;
