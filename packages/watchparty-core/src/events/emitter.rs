//! Event emitter abstraction for decoupling services from observers.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete sink,
//! enabling testing and alternative observers (metrics, admin UIs).

use super::PartyEvent;

/// Trait for emitting party events without knowledge of who consumes them.
///
/// Emitters are called while a room lock may be held, so implementations
/// must not block or call back into the party service.
pub trait EventEmitter: Send + Sync {
    /// Emits a room or membership lifecycle event.
    fn emit_party(&self, event: PartyEvent);
}

/// No-op emitter for tests and embedders that do not observe events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_party(&self, _event: PartyEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_party(&self, event: PartyEvent) {
        tracing::debug!(?event, "party_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Test emitter that records events.
    struct RecordingEventEmitter {
        events: Mutex<Vec<PartyEvent>>,
    }

    impl EventEmitter for RecordingEventEmitter {
        fn emit_party(&self, event: PartyEvent) {
            self.events.lock().push(event);
        }
    }

    #[test]
    fn recording_emitter_tracks_events() {
        let emitter = Arc::new(RecordingEventEmitter {
            events: Mutex::new(Vec::new()),
        });
        let dyn_emitter: Arc<dyn EventEmitter> = emitter.clone();

        dyn_emitter.emit_party(PartyEvent::RoomClosed {
            room_id: "ABCD".into(),
            timestamp: 0,
        });
        NoopEventEmitter.emit_party(PartyEvent::RoomClosed {
            room_id: "WXYZ".into(),
            timestamp: 0,
        });

        let events = emitter.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].room_id(), "ABCD");
    }
}
