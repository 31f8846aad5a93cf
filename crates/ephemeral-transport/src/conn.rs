//! Per-stream connection identity and topic scoping.
//!
//! Every gRPC stream carries two pieces of request metadata: `x-conn-id`,
//! a client-chosen (or server-assigned) identifier stable across
//! reconnects, and `x-event-scope`, which says whether the stream wants
//! only the events addressed to it (`self`) or the full fan-out of
//! whatever topic it is attached to (`all`).

use ephemeral_core::CoordError;
use tonic::metadata::MetadataMap;
use uuid::Uuid;

const CONN_ID_HEADER: &str = "x-conn-id";
const EVENT_SCOPE_HEADER: &str = "x-event-scope";

/// A client-facing connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(pub String);

impl ConnId {
    /// The bus topic carrying events addressed to this connection alone.
    pub fn topic(&self) -> String {
        format!("conn-{}", self.0)
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a stream wants events scoped to itself or fanned out broadly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only events addressed to this connection's own topic.
    SelfOnly,
    /// Every event published to the broadcast topic.
    All,
}

impl Scope {
    fn parse(s: &str) -> Result<Self, CoordError> {
        match s {
            "self" => Ok(Self::SelfOnly),
            "all" => Ok(Self::All),
            other => Err(CoordError::validation(format!(
                "unknown {EVENT_SCOPE_HEADER} value {other:?}"
            ))),
        }
    }

    /// The header value this scope is written as.
    pub fn as_header_value(self) -> &'static str {
        match self {
            Self::SelfOnly => "self",
            Self::All => "all",
        }
    }
}

/// Read `x-conn-id` and `x-event-scope` from request metadata. A missing
/// `x-conn-id` is assigned a fresh one rather than rejected, since the
/// first call from a client naturally has nothing to reuse yet.
pub fn read_connection_metadata(metadata: &MetadataMap) -> Result<(ConnId, Scope), CoordError> {
    let conn_id = metadata
        .get(CONN_ID_HEADER)
        .map(|v| {
            v.to_str()
                .map(str::to_string)
                .map_err(|_| CoordError::validation(format!("{CONN_ID_HEADER} is not ASCII")))
        })
        .transpose()?
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let scope = metadata
        .get(EVENT_SCOPE_HEADER)
        .map(|v| {
            v.to_str()
                .map_err(|_| CoordError::validation(format!("{EVENT_SCOPE_HEADER} is not ASCII")))
                .and_then(Scope::parse)
        })
        .transpose()?
        .unwrap_or(Scope::SelfOnly);

    Ok((ConnId(conn_id), scope))
}

/// Write `x-conn-id` and `x-event-scope` onto an outgoing request's
/// metadata, for the client side.
pub fn write_connection_metadata(
    metadata: &mut MetadataMap,
    conn_id: &ConnId,
    scope: Scope,
) -> Result<(), CoordError> {
    metadata.insert(
        CONN_ID_HEADER,
        conn_id
            .0
            .parse()
            .map_err(|_| CoordError::validation(format!("invalid {CONN_ID_HEADER} value")))?,
    );
    metadata.insert(
        EVENT_SCOPE_HEADER,
        scope
            .as_header_value()
            .parse()
            .map_err(|_| CoordError::fatal(format!("invalid {EVENT_SCOPE_HEADER} value")))?,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_conn_id_is_assigned_rather_than_rejected() {
        let metadata = MetadataMap::new();
        let (conn_id, scope) = read_connection_metadata(&metadata).unwrap();
        assert!(!conn_id.0.is_empty());
        assert_eq!(scope, Scope::SelfOnly);
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let mut metadata = MetadataMap::new();
        write_connection_metadata(&mut metadata, &ConnId("abc".to_string()), Scope::All).unwrap();
        let (conn_id, scope) = read_connection_metadata(&metadata).unwrap();
        assert_eq!(conn_id.0, "abc");
        assert_eq!(scope, Scope::All);
    }

    #[test]
    fn unknown_scope_value_is_a_validation_error() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-event-scope", "everyone".parse().unwrap());
        let err = read_connection_metadata(&metadata).unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
