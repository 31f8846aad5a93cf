//! Bridges the player's local bus to the streaming transport (§4.5.2).
//!
//! The inbound half — republishing whatever the transport client reads
//! back onto the player's named topic — is already [`TransportClient::run`]'s
//! job (ephemeral-transport), since it owns the stream's read side. This
//! module supplies the half the transport client does not: draining the
//! `discovery`-bound events the player FSM raises into the client's
//! outbound channel.
//!
//! [`TransportClient::run`]: ephemeral_transport::TransportClient::run

use ephemeral_bus::EventBus;
use ephemeral_core::topics;
use ephemeral_wire::proto::WireEvent;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Pumps FSM-raised events bound for the discovery topic out through the
/// transport client's outbound channel.
pub struct Forwarder {
    bus: EventBus,
}

impl Forwarder {
    /// Wrap the player-local bus this forwarder bridges.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Subscribe to `discovery` on the player bus; for each event observed
    /// there, translate it into a wire message and push it onto `outbound`.
    /// Runs until `shutdown` fires or `outbound` is dropped.
    pub async fn run(&self, outbound: mpsc::Sender<WireEvent>, shutdown: CancellationToken) {
        let rx = self.bus.subscribe(topics::DISCOVERY).await;
        let mut events = tokio_stream::wrappers::BroadcastStream::new(rx);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.next() => {
                    let Some(Ok(event)) = event else { break };
                    let payload = event.meta.wire_payload().map(<[u8]>::to_vec).unwrap_or_default();
                    let decoded = ephemeral_wire::DecodedWireEvent {
                        name: event.name,
                        game_id: event.game_id,
                        player_id: None,
                        payload,
                    };
                    if outbound.send(ephemeral_wire::encode(&decoded)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::{Event, GameId};

    #[tokio::test]
    async fn translates_discovery_events_into_wire_messages() {
        let bus = EventBus::new(16);
        let forwarder = Forwarder::new(bus.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let task_shutdown = shutdown.clone();
        let task = tokio::spawn(async move { forwarder.run(tx, task_shutdown).await });

        let game_id = GameId::new();
        bus.publish(Event::routed(
            "PlayerReady",
            Some(game_id),
            topics::DISCOVERY,
            vec![],
        ))
        .await
        .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.name, "PlayerReady");
        shutdown.cancel();
        let _ = task.await;
    }
}
