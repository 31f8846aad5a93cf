//! Shared kernel for the Ephemeral coordination plane: identifiers, the bus
//! event envelope, the unified error taxonomy, and configuration types.
//!
//! Every other crate in this workspace depends on this one; this one depends
//! on nothing else in the workspace.

pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod player;

pub use config::{
    ActivationConfig, ConfigDuration, DiscoveryConfig, FederationConfig, PortRange,
    SpdzParameters, TupleStoreConfig,
};
pub use error::{CoordError, Result};
pub use event::{topics, Event, EventMeta, FsmHandle};
pub use ids::{GameId, Pod, PlayerId};
pub use player::PlayerDescriptor;
