//! Channel naming and the concrete broker types.
//!
//! Context topics are `"{contextId}:{channel}"` with channel `events` or
//! `state`. The control topic carries neither suffix, so no context id can
//! produce it.

use crate::broker::MessageBroker;
use concord_core::{ContextId, ControlMessage, Event, StateEntry};

/// Channel carrying causally ordered events
pub const EVENTS_CHANNEL: &str = "events";

/// Channel carrying best-effort state broadcasts
pub const STATE_CHANNEL: &str = "state";

/// Reserved cluster-wide control topic
pub const CONTROL_TOPIC: &str = "$concord:control";

/// Topic of `channel` within `context_id`
pub fn context_topic(context_id: &ContextId, channel: &str) -> String {
    format!("{context_id}:{channel}")
}

/// Per-context event channel
pub type EventBroker = MessageBroker<Event>;

/// Per-context state channel
pub type StateBroker = MessageBroker<StateEntry>;

/// Cluster control channel
pub type ControlBroker = MessageBroker<ControlMessage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_topics_never_match_control_topic() {
        let tricky = ContextId::new("$concord");
        assert_eq!(context_topic(&tricky, EVENTS_CHANNEL), "$concord:events");
        assert_ne!(context_topic(&tricky, EVENTS_CHANNEL), CONTROL_TOPIC);
        assert_ne!(context_topic(&tricky, STATE_CHANNEL), CONTROL_TOPIC);
    }
}
