//! Event bridge: session events fan out to every consumer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use chatbridge_core::RelayEvent;

use crate::registry::ClientRegistry;

/// Spawn the task that broadcasts session events in arrival order.
///
/// Ends when every sender of `events` is dropped.
pub fn spawn_event_bridge(
    mut events: mpsc::Receiver<RelayEvent>,
    registry: ClientRegistry,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let delivered = registry.broadcast(&event).await;
            if delivered == 0 {
                debug!(?event, "No consumer received event");
            }
        }
        debug!("Relay event stream closed");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chatbridge_core::ConnectionStatus;

    use super::*;
    use crate::registry::Outbound;

    #[tokio::test]
    async fn events_are_broadcast_in_order() {
        let registry = ClientRegistry::new();
        let (consumer_tx, mut consumer_rx) = mpsc::channel(16);
        registry.register(consumer_tx).await;

        let (tx, rx) = mpsc::channel(16);
        let bridge = spawn_event_bridge(rx, registry);

        tx.send(RelayEvent::PairingCode { qr: "2@q".into() })
            .await
            .unwrap();
        tx.send(RelayEvent::status(ConnectionStatus::Connected))
            .await
            .unwrap();
        drop(tx);
        bridge.await.unwrap();

        assert_eq!(
            consumer_rx.recv().await.unwrap(),
            Outbound::Frame(Arc::new(r#"{"type":"qr","qr":"2@q"}"#.into()))
        );
        assert_eq!(
            consumer_rx.recv().await.unwrap(),
            Outbound::Frame(Arc::new(r#"{"type":"status","status":"connected"}"#.into()))
        );
    }
}
