//! Optional activity monitoring
//!
//! The engine reports notable events to an optional sink; when none is
//! configured the calls are skipped. Sinks are fire-and-forget: they
//! must not fail and must not slow the message path down.

use crate::session::ConversationState;
use tracing::info;

/// Events the engine reports to a configured sink
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    /// A message was handled to completion
    MessageProcessed {
        /// Sender identity
        sender: String,
        /// Conversation state at the start of handling
        state: ConversationState,
        /// Wall time from message arrival to completion, in milliseconds
        response_time_ms: i64,
    },
    /// Handling failed and the session was reset
    MessageFailed {
        /// Sender identity
        sender: String,
        /// Rendered error
        error: String,
    },
    /// A sender hit the hourly cap
    RateLimited {
        /// Sender identity
        sender: String,
    },
}

/// Fire-and-forget activity collaborator
pub trait ActivitySink: Send + Sync {
    /// Record one event; implementations must never block or panic
    fn record(&self, event: &ActivityEvent);
}

/// Sink that forwards events to the tracing subscriber
#[derive(Default)]
pub struct TracingSink;

impl ActivitySink for TracingSink {
    fn record(&self, event: &ActivityEvent) {
        match event {
            ActivityEvent::MessageProcessed {
                sender,
                state,
                response_time_ms,
            } => info!("📊 Processed message from {sender} (state {state:?}, {response_time_ms}ms)"),
            ActivityEvent::MessageFailed { sender, error } => {
                info!("📊 Message from {sender} failed: {error}");
            }
            ActivityEvent::RateLimited { sender } => info!("📊 Rate limited {sender}"),
        }
    }
}
