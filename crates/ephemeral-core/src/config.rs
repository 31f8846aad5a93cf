//! Configuration types for Discovery and Activation (§6).
//!
//! These are pure data structures: parsing a config file into one of them,
//! or serving it over HTTP, is a concern of the binary that owns it. Fields
//! that name cryptographic material (MAC keys, the field prime, the
//! Montgomery inverse) are carried as opaque decimal strings — this crate
//! never interprets them, it only validates that they parse as big integers.

use crate::error::CoordError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A duration given in the config file as a string such as `"30s"` or
/// `"5m"`, matching the wire-facing JSON schema in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigDuration(pub Duration);

impl ConfigDuration {
    /// Construct directly from a `Duration`.
    pub fn from_duration(d: Duration) -> Self {
        Self(d)
    }

    fn parse(s: &str) -> Result<Duration, CoordError> {
        let (digits, unit) = s.split_at(
            s.find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| CoordError::validation(format!("malformed duration: {s}")))?,
        );
        let value: u64 = digits
            .parse()
            .map_err(|_| CoordError::validation(format!("malformed duration: {s}")))?;
        let seconds = match unit {
            "s" => value,
            "m" => value * 60,
            "h" => value * 3600,
            "ms" => return Ok(Duration::from_millis(value)),
            other => {
                return Err(CoordError::validation(format!(
                    "unknown duration unit {other:?} in {s:?}"
                )))
            }
        };
        Ok(Duration::from_secs(seconds))
    }
}

impl TryFrom<String> for ConfigDuration {
    type Error = CoordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).map(Self)
    }
}

impl From<ConfigDuration> for String {
    fn from(d: ConfigDuration) -> Self {
        format!("{}s", d.0.as_secs())
    }
}

/// A start:end inclusive TCP port range, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    /// First usable port, inclusive.
    pub start: u16,
    /// Last usable port, inclusive.
    pub end: u16,
}

impl PortRange {
    /// Number of ports covered by this range.
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Whether the range contains no ports (always false once parsed, since
    /// `start <= end` is enforced at construction, but kept for API parity
    /// with other length-bearing types).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<String> for PortRange {
    type Error = CoordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (start, end) = s
            .split_once(':')
            .ok_or_else(|| CoordError::validation(format!("malformed port range: {s}")))?;
        let start: u16 = start
            .parse()
            .map_err(|_| CoordError::validation(format!("malformed port range: {s}")))?;
        let end: u16 = end
            .parse()
            .map_err(|_| CoordError::validation(format!("malformed port range: {s}")))?;
        if start > end {
            return Err(CoordError::validation(format!(
                "port range start {start} exceeds end {end}"
            )));
        }
        Ok(Self { start, end })
    }
}

impl From<PortRange> for String {
    fn from(r: PortRange) -> Self {
        format!("{}:{}", r.start, r.end)
    }
}

/// Opaque cryptographic parameters passed through to the MPC runtime;
/// validated only for well-formedness, never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpdzParameters {
    /// Decimal-string representation of the field prime.
    pub prime: String,
    /// Decimal-string representation of the Montgomery inverse of the prime.
    pub r_inv: String,
    /// MAC key shares, one per tuple type, base64-encoded.
    pub mac_keys: HashMap<String, String>,
}

impl SpdzParameters {
    /// Check that `prime` and `r_inv` parse as (arbitrarily large) decimal
    /// integers. Does not validate that they form a valid Montgomery pair;
    /// that is the MPC runtime's concern.
    pub fn validate(&self) -> Result<(), CoordError> {
        for (field, value) in [("prime", &self.prime), ("r_inv", &self.r_inv)] {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(CoordError::validation(format!(
                    "spdz.{field} is not a decimal integer"
                )));
            }
        }
        Ok(())
    }
}

/// Tuple store (Castor) connection parameters, passed through unopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleStoreConfig {
    /// Base URL of the tuple store for this player.
    pub endpoint: String,
    /// Number of tuples to request per replenishment round.
    pub batch_size: u32,
}

/// Configuration for one Discovery service instance (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// This site's zero-based player identifier.
    pub player_id: u32,
    /// Total number of players expected to join each game.
    pub player_count: u32,
    /// Address the client-facing gRPC/HTTP frontend binds to.
    pub frontend_address: String,
    /// TCP ports made available for per-game MPC network allocation.
    pub port_range: PortRange,
    /// Capacity of the in-process event bus's broadcast channel.
    pub bus_capacity: usize,
    /// How long a game may wait in `WaitPlayersReady` before failing.
    pub players_ready_timeout: ConfigDuration,
    /// How long a game may wait in `WaitTCPCheck` before failing.
    pub tcp_check_timeout: ConfigDuration,
    /// If set, this instance is part of a federation: either the master
    /// (authoritative over every Game FSM) or a slave forwarding every
    /// client-inbound event upstream (§4.4, §4.4.4).
    pub federation: Option<FederationConfig>,
}

/// Master/slave federation wiring (§4.4, §4.4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Whether this instance acts as the federation master.
    pub is_master: bool,
    /// On a master: the other sites' Discovery frontends, reflected
    /// outgoing events are broadcast for. On a slave: its single upstream
    /// master's frontend address (only the first entry is used).
    pub peer_addresses: Vec<String>,
}

impl DiscoveryConfig {
    /// Validate cross-field invariants not expressible in the type alone.
    pub fn validate(&self) -> Result<(), CoordError> {
        if self.player_id >= self.player_count {
            return Err(CoordError::validation(format!(
                "player_id {} must be less than player_count {}",
                self.player_id, self.player_count
            )));
        }
        if self.player_count < 2 {
            return Err(CoordError::validation(
                "player_count must be at least 2".to_string(),
            ));
        }
        if self.bus_capacity == 0 {
            return Err(CoordError::validation(
                "bus_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for one Activation service instance (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// This site's zero-based player identifier.
    pub player_id: u32,
    /// Address the HTTP activation endpoint binds to.
    pub http_address: String,
    /// Discovery frontend this player registers against.
    pub discovery_address: String,
    /// Path to the MPC runtime binary invoked for each activation.
    pub mpc_runtime_path: String,
    /// SPDZ-style cryptographic parameters passed to the runtime.
    pub spdz: SpdzParameters,
    /// Tuple store connection parameters.
    pub tuple_store: TupleStoreConfig,
    /// How long to wait for all peers to become reachable before failing.
    pub peer_connect_timeout: ConfigDuration,
    /// How long to wait for the MPC runtime to exit after computation ends.
    pub runtime_exit_timeout: ConfigDuration,
    /// Base port for this site's per-peer TCP forwarding listeners; one
    /// listener binds at `peer_proxy_base_port + peer.id` for each peer.
    pub peer_proxy_base_port: u16,
}

impl ActivationConfig {
    /// Validate cross-field invariants not expressible in the type alone.
    pub fn validate(&self) -> Result<(), CoordError> {
        self.spdz.validate()?;
        if self.tuple_store.batch_size == 0 {
            return Err(CoordError::validation(
                "tuple_store.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The base port forwarding listeners are offset from.
    pub fn peer_base_port(&self) -> u16 {
        self.peer_proxy_base_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_parses_and_rejects_reversed_bounds() {
        let range: PortRange = "30000:30100".to_string().try_into().unwrap();
        assert_eq!(range.start, 30000);
        assert_eq!(range.end, 30100);
        assert_eq!(range.len(), 101);

        let err: Result<PortRange, _> = "30100:30000".to_string().try_into();
        assert!(err.is_err());
    }

    #[test]
    fn config_duration_parses_known_units() {
        assert_eq!(
            ConfigDuration::parse("30s").unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            ConfigDuration::parse("5m").unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            ConfigDuration::parse("250ms").unwrap(),
            Duration::from_millis(250)
        );
        assert!(ConfigDuration::parse("30x").is_err());
    }

    #[test]
    fn spdz_parameters_reject_non_numeric_prime() {
        let params = SpdzParameters {
            prime: "not-a-number".to_string(),
            r_inv: "123".to_string(),
            mac_keys: HashMap::new(),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn discovery_config_rejects_player_id_out_of_range() {
        let config = DiscoveryConfig {
            player_id: 2,
            player_count: 2,
            frontend_address: "0.0.0.0:9000".to_string(),
            port_range: PortRange { start: 30000, end: 30100 },
            bus_capacity: 1024,
            players_ready_timeout: ConfigDuration::from_duration(Duration::from_secs(30)),
            tcp_check_timeout: ConfigDuration::from_duration(Duration::from_secs(30)),
            federation: None,
        };
        assert!(config.validate().is_err());
    }
}
