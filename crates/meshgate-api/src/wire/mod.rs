//! Envelopes exchanged with the gateway.
//!
//! Outbound: `{"id": ..., "type": "operation", "operation": {"type": <opcode>, ...}}`
//! Inbound:  `{"type": "event", "gatewayId": ..., "event": {"type": <opcode>, "timestamp": ..., ...}}`
//!
//! Only inbound envelopes whose outer `type` is `"event"` carry anything
//! worth dispatching; see [`EventEnvelope::decode`].

mod event;
mod operation;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use event::{
    AppKeyList, BeaconList, CurrentFaults, DecodeError, DecodedEvent, Event, EventKind,
    HealthAttention, HealthClientTimeout, HealthPeriod, NodeDiscoverResult, NodeList,
    RegisteredFaults, SubnetList, SubscribeList,
};
pub use operation::{AddressEntry, NodeConfiguration, Operation, PeriodUnits};

/// Outer `type` tag of every outbound envelope.
pub const OPERATION_KIND: &str = "operation";

/// Outer `type` tag of every inbound envelope the dispatcher acts on.
pub const EVENT_KIND: &str = "event";

// ── Outbound ─────────────────────────────────────────────────────────

/// A request for the gateway, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub operation: Operation,
}

impl OperationEnvelope {
    /// Wrap an operation under a freshly generated request id.
    pub fn new(operation: Operation) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), operation)
    }

    pub fn with_id(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            kind: OPERATION_KIND.into(),
            operation,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A message from the gateway, before the payload is typed.
///
/// The payload stays raw JSON until [`decode`](Self::decode) so that an
/// unknown event type can be told apart from a malformed known one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,

    /// Request id, when the gateway echoes the one it was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub event: serde_json::Value,
}

impl EventEnvelope {
    /// Build an inbound envelope around a typed event (fake gateways, tests).
    pub fn from_event(gateway_id: impl Into<String>, event: &Event) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: EVENT_KIND.into(),
            gateway_id: Some(gateway_id.into()),
            id: None,
            event: serde_json::to_value(event)?,
        })
    }

    pub fn is_event(&self) -> bool {
        self.kind == EVENT_KIND
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operation_envelope_matches_gateway_shape() {
        let envelope = OperationEnvelope::with_id("abc", Operation::SubnetRequest);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            serde_json::json!({
                "id": "abc",
                "type": "operation",
                "operation": { "type": "subnet_request" }
            })
        );
    }

    #[test]
    fn new_envelopes_get_distinct_ids() {
        let a = OperationEnvelope::new(Operation::NodeRequest);
        let b = OperationEnvelope::new(Operation::NodeRequest);
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, OPERATION_KIND);
    }

    #[test]
    fn event_envelope_reads_gateway_id() {
        let raw = br#"{
            "type": "event",
            "gatewayId": "nrf-352656100000000",
            "event": { "type": "subscribe_list", "timestamp": "2020-05-01T10:00:00Z", "addressList": [] }
        }"#;
        let envelope = EventEnvelope::from_slice(raw).unwrap();
        assert!(envelope.is_event());
        assert_eq!(envelope.gateway_id.as_deref(), Some("nrf-352656100000000"));
        assert!(envelope.id.is_none());
    }
}
