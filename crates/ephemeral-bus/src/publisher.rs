//! Convenience wrapper over [`EventBus`] for the common publish shapes used
//! by FSM callbacks and the transport layer.

use crate::bus::EventBus;
use ephemeral_core::{CoordError, Event, FsmHandle, GameId};

/// Thin, cloneable façade over an [`EventBus`] that spells out the handful
/// of publish shapes the rest of the coordination plane actually needs,
/// rather than requiring every call site to build an `Event` by hand.
#[derive(Clone)]
pub struct Publisher {
    bus: EventBus,
}

impl Publisher {
    /// Wrap a bus handle.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Publish a bare named event with no game, FSM handle, or payload.
    pub async fn publish(&self, name: impl Into<String>, topic: &str) -> Result<(), CoordError> {
        self.bus
            .publish(Event::routed(name, None, topic, Vec::new()))
            .await
    }

    /// Publish a named event scoped to a game, with no FSM handle or
    /// payload.
    pub async fn publish_for_game(
        &self,
        name: impl Into<String>,
        game_id: GameId,
        topic: &str,
    ) -> Result<(), CoordError> {
        self.bus
            .publish(Event::routed(name, Some(game_id), topic, Vec::new()))
            .await
    }

    /// Publish a named event directed at a specific FSM.
    pub async fn publish_to_fsm(
        &self,
        name: impl Into<String>,
        game_id: Option<GameId>,
        handle: FsmHandle,
        topic: &str,
    ) -> Result<(), CoordError> {
        self.bus
            .publish(Event::for_fsm(name, game_id, handle, topic, Vec::new()))
            .await
    }

    /// Publish every effect an FSM transition produced, in order.
    pub async fn publish_all(&self, events: Vec<Event>) -> Result<(), CoordError> {
        for event in events {
            self.bus.publish(event).await?;
        }
        Ok(())
    }

    /// Access the underlying bus, e.g. to subscribe.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::topics;

    #[tokio::test]
    async fn publish_for_game_carries_the_game_id() {
        let publisher = Publisher::new(EventBus::new(16));
        let mut rx = publisher.bus().subscribe(topics::DISCOVERY).await;
        let game_id = GameId::new();
        publisher
            .publish_for_game("GameStarted", game_id, topics::DISCOVERY)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.game_id, Some(game_id));
    }
}
