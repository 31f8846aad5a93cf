//! The client half of the streaming transport, used by a federation slave
//! to forward events to its master, and by test harnesses that need to
//! drive a Discovery or Activation service as an external client would.

use crate::conn::{write_connection_metadata, ConnId, Scope};
use ephemeral_bus::EventBus;
use ephemeral_core::{topics, CoordError, Event};
use ephemeral_wire::proto::event_stream_client::EventStreamClient;
use ephemeral_wire::proto::WireEvent;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Request;

/// Connects to a remote transport server, pumping locally-published events
/// out and remotely-published events into the local bus.
pub struct TransportClient {
    client: EventStreamClient<Channel>,
    conn_id: ConnId,
    scope: Scope,
}

impl TransportClient {
    /// Connect to `endpoint` (e.g. `"http://127.0.0.1:9000"`), identifying
    /// this connection as `conn_id` with the given scope.
    pub async fn connect(
        endpoint: impl Into<String>,
        conn_id: ConnId,
        scope: Scope,
    ) -> Result<Self, CoordError> {
        let channel = Channel::from_shared(endpoint.into())
            .map_err(|err| CoordError::validation(err.to_string()))?
            .connect()
            .await
            .map_err(|err| CoordError::peer(err.to_string()))?;
        Ok(Self {
            client: EventStreamClient::new(channel),
            conn_id,
            scope,
        })
    }

    /// Open the bidi stream: consume `outbound` for what to send, publish
    /// everything received onto `local_bus`'s `target_topic`, until
    /// `shutdown` fires.
    pub async fn run(
        mut self,
        mut outbound: mpsc::Receiver<WireEvent>,
        local_bus: EventBus,
        target_topic: String,
        shutdown: CancellationToken,
    ) -> Result<(), CoordError> {
        let (tx, rx) = mpsc::channel(64);
        let forward_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_shutdown.cancelled() => break,
                    maybe_msg = outbound.recv() => {
                        match maybe_msg {
                            Some(msg) => {
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let mut request = Request::new(ReceiverStream::new(rx));
        write_connection_metadata(request.metadata_mut(), &self.conn_id, self.scope)?;

        let response = self
            .client
            .events(request)
            .await
            .map_err(|status| CoordError::peer(status.to_string()))?;
        let mut inbound = response.into_inner();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = inbound.next() => {
                    let Some(result) = next else { break };
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(status) => {
                            tracing::warn!(%status, "transport client inbound error, closing");
                            break;
                        }
                    };
                    let decoded = match ephemeral_wire::decode(msg) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            tracing::warn!(%err, "dropping malformed wire event");
                            continue;
                        }
                    };
                    let event = Event::from_wire(
                        decoded.name,
                        decoded.game_id,
                        decoded.payload,
                        target_topic.clone(),
                        vec![topics::MASTER_OUTGOING_EVENTS.to_string()],
                    );
                    if let Err(err) = local_bus.publish(event).await {
                        tracing::warn!(%err, "failed to publish event received from peer");
                    }
                }
            }
        }
        Ok(())
    }
}
