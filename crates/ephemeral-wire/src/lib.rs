//! Generated gRPC wire types and the domain/wire boundary conversions (§4.3,
//! §5). `proto` is produced by `tonic-build` from `proto/events.proto` at
//! build time; `bias` and `codec` are the only places in this workspace that
//! know the +100 player-id offset exists.

mod bias;
mod codec;

/// Generated protobuf message and gRPC service types.
pub mod proto {
    #![allow(clippy::all, missing_docs)]
    tonic::include_proto!("ephemeral.wire");
}

pub use bias::{from_wire as player_id_from_wire, to_wire as player_id_to_wire};
pub use codec::{decode, encode, DecodedWireEvent};
