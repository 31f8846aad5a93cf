//! The +100 wire bias (§5, design notes): protobuf3 elides zero-valued
//! scalar fields, so an unbiased player 0 would be indistinguishable on the
//! wire from "no player set". Every `player_id` field is biased by this
//! constant going out, and unbiased coming in — here, and nowhere else.

use ephemeral_core::{CoordError, PlayerId};

const BIAS: i32 = 100;

/// Apply the wire bias. `None` (no player) becomes the wire zero value.
pub fn to_wire(player_id: Option<PlayerId>) -> i32 {
    match player_id {
        Some(id) => i32::try_from(id.0).unwrap_or(i32::MAX) + BIAS,
        None => 0,
    }
}

/// Invert the wire bias. A wire zero value means no player was set.
pub fn from_wire(value: i32) -> Result<Option<PlayerId>, CoordError> {
    if value == 0 {
        return Ok(None);
    }
    let unbiased = value - BIAS;
    if unbiased < 0 {
        return Err(CoordError::protocol(format!(
            "wire player_id {value} is below the +{BIAS} bias floor"
        )));
    }
    Ok(Some(PlayerId(unbiased as u32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_zero_is_distinguishable_from_absent() {
        assert_eq!(to_wire(None), 0);
        assert_eq!(to_wire(Some(PlayerId(0))), 100);
        assert_eq!(from_wire(0).unwrap(), None);
        assert_eq!(from_wire(100).unwrap(), Some(PlayerId(0)));
    }

    #[test]
    fn bias_roundtrips_for_every_player_in_a_large_game() {
        for raw in 0..64u32 {
            let id = PlayerId(raw);
            let wire = to_wire(Some(id));
            assert_eq!(from_wire(wire).unwrap(), Some(id));
        }
    }

    #[test]
    fn value_below_the_bias_floor_is_a_protocol_error() {
        let err = from_wire(42).unwrap_err();
        assert_eq!(err.category(), "protocol");
    }
}
