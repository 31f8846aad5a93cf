//! Identifiers shared by the coordination plane.
//!
//! `PlayerId` is always the *unbiased* zero-based logical index. The +100
//! wire bias (a workaround for protobuf3 eliding zero-valued scalar fields)
//! is applied and inverted at exactly the transport boundary, in
//! `ephemeral-wire`; nothing in this crate or above it ever sees a biased
//! value.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Federation-wide identifier for one game (one run of the MPC computation
/// across all players).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(Uuid);

impl GameId {
    /// Generate a fresh random game identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a game identifier from its canonical UUID string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GameId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A player's zero-based logical index, unbiased. `player_count` distinct
/// values `0..player_count` identify the players of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compute instance at a site; owns exactly one network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pod(pub String);

impl fmt::Display for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Pod {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Pod {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_id_roundtrips_through_its_string_form() {
        let id = GameId::new();
        let parsed = GameId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn game_id_parses_the_scenario_literal() {
        let id = GameId::parse("71b2a100-f3f6-11e9-81b4-2a2ae2dbcce4").unwrap();
        assert_eq!(
            id.to_string(),
            "71b2a100-f3f6-11e9-81b4-2a2ae2dbcce4"
        );
    }
}
