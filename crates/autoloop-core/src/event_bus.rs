use tokio::sync::broadcast;

use autoloop_types::CoreEvent;

/// In-process publish/subscribe bus. The core treats this as an external
/// collaborator per §1/§9 ("thread it through the orchestrator's
/// constructor") but ships the obvious `tokio::sync::broadcast`-backed
/// implementation directly, same as the reference engine's `EventBus`
/// does for its own `EngineEvent` stream.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publication never fails the caller: a lagging or absent subscriber
    /// must never block or abort the orchestrator task.
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_types::SessionId;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(CoreEvent::new(
            "session.started",
            SessionId::new(),
            json!({"ok": true}),
        ));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "session.started");
    }
}
