//! Fallback transition events.
//!
//! When the engine gives up on one tool and moves to the next, it publishes a
//! [`FallbackEvent`] on a broadcast channel. Subscribers (statistics, tests,
//! embedding applications) observe transitions without parsing logs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per subscriber before lagging receivers lose the oldest.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The engine moved from one tool to the next within a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub from_tool: String,
    pub to_tool: String,
    /// Error reported by `from_tool`, or the reason its result was rejected.
    pub reason: String,
    pub query: String,
}

/// Sending half shared by the engine; cheap to clone.
#[derive(Debug, Clone)]
pub struct FallbackEvents {
    tx: broadcast::Sender<FallbackEvent>,
}

impl FallbackEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to transitions published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FallbackEvent> {
        self.tx.subscribe()
    }

    /// Publish a transition. Having no subscribers is not an error.
    pub fn publish(&self, event: FallbackEvent) {
        tracing::warn!(
            from = %event.from_tool,
            to = %event.to_tool,
            reason = %event.reason,
            "falling back to next tool"
        );
        let _ = self.tx.send(event);
    }
}

impl Default for FallbackEvents {
    fn default() -> Self {
        Self::new()
    }
}
