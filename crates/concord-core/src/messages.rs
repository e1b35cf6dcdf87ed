//! Wire payloads exchanged between nodes.
//!
//! Field names on the wire follow the cluster contract (`type`, `vectorClock`,
//! `originNode`) so that nodes built from other toolchains can interoperate.

use crate::clock::VectorClockSnapshot;
use crate::identifiers::{ContextId, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registry entry proving that a context exists cluster-wide.
///
/// Immutable once created; deleted by `destroy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Context identifier
    pub id: ContextId,
    /// Stage type the context was created with
    #[serde(rename = "type")]
    pub context_type: String,
}

impl ContextRecord {
    /// Create a new record
    pub fn new(id: impl Into<ContextId>, context_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_type: context_type.into(),
        }
    }
}

/// Causally ordered event emitted inside a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event id
    pub id: String,
    /// Application-defined event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// Application payload
    pub payload: serde_json::Value,
    /// Clock snapshot taken when the event was emitted
    pub vector_clock: VectorClockSnapshot,
    /// Node that emitted the event
    pub origin_node: NodeId,
}

impl Event {
    /// Create an event with a fresh id
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        vector_clock: VectorClockSnapshot,
        origin_node: NodeId,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload,
            vector_clock,
            origin_node,
        }
    }
}

/// Best-effort state broadcast; carries no causal metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Notification key listeners subscribe to
    pub key: String,
    /// Arbitrary data
    pub data: serde_json::Value,
}

impl StateEntry {
    /// Create a state entry
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

/// Cluster-wide control broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Control verb
    pub key: String,
    /// Verb argument
    pub data: serde_json::Value,
}

/// Decoded control verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Dispose the local instance of a context
    Destroy(ContextId),
    /// Verb this node does not understand
    Unknown(String),
}

impl ControlMessage {
    /// Key of the destroy verb
    pub const DESTROY: &'static str = "destroy";

    /// Build a destroy broadcast for `context_id`
    pub fn destroy(context_id: &ContextId) -> Self {
        Self {
            key: Self::DESTROY.to_string(),
            data: serde_json::Value::String(context_id.as_str().to_string()),
        }
    }

    /// Interpret the message.
    ///
    /// A `destroy` whose data is not a string is reported as unknown.
    pub fn kind(&self) -> ControlKind {
        match (self.key.as_str(), &self.data) {
            (Self::DESTROY, serde_json::Value::String(id)) => {
                ControlKind::Destroy(ContextId::new(id.clone()))
            }
            _ => ControlKind::Unknown(self.key.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_field_names() {
        let event = Event::new(
            "join",
            json!({"actor": "p1"}),
            VectorClockSnapshot::new(),
            NodeId::new("n1"),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "join");
        assert_eq!(value["originNode"], "n1");
        assert!(value.get("vectorClock").is_some());
    }

    #[test]
    fn test_context_record_uses_type_field() {
        let record = ContextRecord::new("room-1", "lobby");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"id": "room-1", "type": "lobby"}));
    }

    #[test]
    fn test_control_kind() {
        let id = ContextId::new("room-1");
        assert_eq!(ControlMessage::destroy(&id).kind(), ControlKind::Destroy(id));

        let other = ControlMessage {
            key: "rebalance".into(),
            data: json!(null),
        };
        assert_eq!(other.kind(), ControlKind::Unknown("rebalance".into()));

        let malformed = ControlMessage {
            key: ControlMessage::DESTROY.into(),
            data: json!(42),
        };
        assert!(matches!(malformed.kind(), ControlKind::Unknown(_)));
    }
}
