//! The player descriptor carried in wire events' domain payload (§6:
//! "wire-event schema"). The transport and wire crates never interpret
//! this shape; they only see the bytes it serializes to.

use crate::ids::{Pod, PlayerId};
use serde::{Deserialize, Serialize};

/// One player's network identity as seen by its peers, attached to
/// `PlayersReady` and other outgoing wire events so that remote sites and
/// the MPC runtime driver can build their peer-connectivity tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    /// The player's logical index.
    pub id: PlayerId,
    /// Total number of players in this game, repeated on every descriptor
    /// so a single descriptor is self-describing.
    pub count: u32,
    /// The site address hosting this player.
    pub ip: String,
    /// The TCP port allocated for this player's MPC network endpoint.
    pub port: u16,
    /// The compute pod hosting this player.
    pub pod: Pod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_plain_data() {
        let d = PlayerDescriptor {
            id: PlayerId(0),
            count: 2,
            ip: "192.168.0.1".to_string(),
            port: 30000,
            pod: Pod::from("pod1"),
        };
        assert_eq!(d.id, PlayerId(0));
    }
}
