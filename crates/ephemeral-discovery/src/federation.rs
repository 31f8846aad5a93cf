//! Federation slave wiring (§4.4.4): connects to a single upstream master
//! over C3 with scope `all`, forwarding locally-resolved wire events up and
//! reflecting master-outbound events back to local clients.
//!
//! This is a thin specialization of [`TransportClient`], already built
//! anticipating this use (see its own doc comment): the slave's job is just
//! naming the conventions — its own connection id, scope `all`, and
//! `clientOutgoingEvents` as the topic master broadcasts land on locally.

use ephemeral_bus::EventBus;
use ephemeral_core::{topics, CoordError};
use ephemeral_transport::{ConnId, Scope, TransportClient};
use ephemeral_wire::proto::WireEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A running (or about-to-run) connection to this site's federation master.
pub struct FederationSlave {
    master_address: String,
}

impl FederationSlave {
    /// Wrap the address of the upstream master's frontend.
    pub fn new(master_address: impl Into<String>) -> Self {
        Self {
            master_address: master_address.into(),
        }
    }

    /// Connect to the master and run until `shutdown` fires: `outbound`
    /// carries wire events this site has already resolved locally (network
    /// allocation done, foreign-site ports trusted); everything the master
    /// sends back is published onto `local_bus` at `clientOutgoingEvents`,
    /// exactly as if it had originated from this site's own Game FSMs.
    pub async fn run(
        self,
        outbound: mpsc::Receiver<WireEvent>,
        local_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Result<(), CoordError> {
        let conn_id = ConnId(format!("federation-slave-{}", uuid::Uuid::new_v4()));
        let client = TransportClient::connect(self.master_address.clone(), conn_id, Scope::All).await?;
        client
            .run(
                outbound,
                local_bus,
                topics::CLIENT_OUTGOING_EVENTS.to_string(),
                shutdown,
            )
            .await
    }
}
