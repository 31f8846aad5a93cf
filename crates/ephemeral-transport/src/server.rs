//! The server half of the streaming transport: one gRPC bidi stream per
//! client connection, fed from and feeding back into the event bus.

use crate::conn::{read_connection_metadata, Scope};
use ephemeral_bus::EventBus;
use ephemeral_core::{topics, Event};
use ephemeral_wire::proto::event_stream_server::EventStream;
use ephemeral_wire::proto::WireEvent;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use tokio_stream::wrappers::BroadcastStream;
use tonic::{Request, Response, Status, Streaming};

/// gRPC service wiring the transport to an [`EventBus`]. One instance is
/// shared (cheaply cloned) across every accepted stream.
#[derive(Clone)]
pub struct TransportServer {
    bus: EventBus,
}

impl TransportServer {
    /// Wrap a bus handle.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

type EventsStream = Pin<Box<dyn Stream<Item = Result<WireEvent, Status>> + Send>>;

#[tonic::async_trait]
impl EventStream for TransportServer {
    type EventsStream = EventsStream;

    async fn events(
        &self,
        request: Request<Streaming<WireEvent>>,
    ) -> Result<Response<Self::EventsStream>, Status> {
        let (conn_id, scope) = read_connection_metadata(request.metadata())
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        tracing::info!(%conn_id, ?scope, "transport stream accepted");

        let subscribe_topic = match scope {
            Scope::SelfOnly => conn_id.topic(),
            Scope::All => topics::BROADCAST.to_string(),
        };
        let rx = self.bus.subscribe(&subscribe_topic).await;

        let mut inbound = request.into_inner();
        let inbound_bus = self.bus.clone();
        let inbound_conn_id = conn_id.clone();
        tokio::spawn(async move {
            while let Some(result) = inbound.next().await {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(status) => {
                        tracing::warn!(%inbound_conn_id, %status, "inbound stream error, closing");
                        break;
                    }
                };
                let decoded = match ephemeral_wire::decode(msg) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        tracing::warn!(%inbound_conn_id, %err, "dropping malformed wire event");
                        continue;
                    }
                };
                let event = Event::from_wire(
                    decoded.name,
                    decoded.game_id,
                    decoded.payload,
                    topics::CLIENT_INCOMING_EVENTS,
                    vec![inbound_conn_id.topic()],
                );
                if let Err(err) = inbound_bus.publish(event).await {
                    tracing::warn!(%inbound_conn_id, %err, "failed to publish incoming event");
                }
            }
            tracing::info!(%inbound_conn_id, "inbound stream pump exited");
        });

        let outbound = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(event) => Some(Ok(to_wire_event(&event))),
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "outbound stream lagged, dropping");
                    None
                }
            }
        });

        Ok(Response::new(Box::pin(outbound)))
    }
}

fn to_wire_event(event: &Event) -> WireEvent {
    let decoded = ephemeral_wire::DecodedWireEvent {
        name: event.name.clone(),
        game_id: event.game_id,
        player_id: None,
        payload: event.meta.wire_payload().map(<[u8]>::to_vec).unwrap_or_default(),
    };
    ephemeral_wire::encode(&decoded)
}
