use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

use super::EventEnvelope;
use crate::model::{
    AppKey, Beacon, HealthFault, ModelMessage, NodeDetail, NodeSummary, ProvisionResult,
    ResetResult, Subnet, Subscription,
};

// ── Opcode table ─────────────────────────────────────────────────────

/// Every inbound event type the gateway is known to emit.
///
/// Parsing the `type` string through this table is what separates an
/// unrecognized event (no entry) from a malformed one (entry, bad payload).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    BeaconList,
    SubnetList,
    AppKeyList,
    NodeList,
    NodeDiscoverResult,
    ProvisionResult,
    ResetResult,
    SubscribeList,
    ReceiveModelMessage,
    HealthFaultsCurrent,
    HealthFaultsRegistered,
    HealthPeriod,
    HealthAttention,
    HealthClientTimeout,
}

impl EventKind {
    /// Events the gateway sends on its own, never as the answer to a request.
    pub fn is_unsolicited(self) -> bool {
        matches!(self, Self::ReceiveModelMessage | Self::HealthFaultsCurrent)
    }
}

// ── Typed payloads ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconList {
    pub beacons: Vec<Beacon>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetList {
    pub subnet_list: Vec<Subnet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKeyList {
    pub app_key_list: Vec<AppKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeList {
    pub nodes: Vec<NodeSummary>,
}

/// Node discovery answer. `error`/`status` are non-zero on failure, in
/// which case the detail fields are typically absent and default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDiscoverResult {
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub status: i64,
    #[serde(flatten)]
    pub detail: NodeDetail,
}

impl NodeDiscoverResult {
    pub fn is_success(&self) -> bool {
        self.error == 0 && self.status == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeList {
    pub address_list: Vec<Subscription>,
}

/// Unsolicited fault report published by a node's health server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFaults {
    pub address: u16,
    pub test_id: u8,
    pub company_id: u16,
    #[serde(default)]
    pub faults: Vec<HealthFault>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredFaults {
    #[serde(default)]
    pub test_id: u8,
    #[serde(default)]
    pub faults: Vec<HealthFault>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPeriod {
    pub divisor: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthAttention {
    pub attention: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthClientTimeout {
    pub timeout: u32,
}

/// A typed inbound event. One variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BeaconList(BeaconList),
    SubnetList(SubnetList),
    AppKeyList(AppKeyList),
    NodeList(NodeList),
    NodeDiscoverResult(NodeDiscoverResult),
    ProvisionResult(ProvisionResult),
    ResetResult(ResetResult),
    SubscribeList(SubscribeList),
    ReceiveModelMessage(ModelMessage),
    HealthFaultsCurrent(CurrentFaults),
    HealthFaultsRegistered(RegisteredFaults),
    HealthPeriod(HealthPeriod),
    HealthAttention(HealthAttention),
    HealthClientTimeout(HealthClientTimeout),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::BeaconList(_) => EventKind::BeaconList,
            Self::SubnetList(_) => EventKind::SubnetList,
            Self::AppKeyList(_) => EventKind::AppKeyList,
            Self::NodeList(_) => EventKind::NodeList,
            Self::NodeDiscoverResult(_) => EventKind::NodeDiscoverResult,
            Self::ProvisionResult(_) => EventKind::ProvisionResult,
            Self::ResetResult(_) => EventKind::ResetResult,
            Self::SubscribeList(_) => EventKind::SubscribeList,
            Self::ReceiveModelMessage(_) => EventKind::ReceiveModelMessage,
            Self::HealthFaultsCurrent(_) => EventKind::HealthFaultsCurrent,
            Self::HealthFaultsRegistered(_) => EventKind::HealthFaultsRegistered,
            Self::HealthPeriod(_) => EventKind::HealthPeriod,
            Self::HealthAttention(_) => EventKind::HealthAttention,
            Self::HealthClientTimeout(_) => EventKind::HealthClientTimeout,
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Why an inbound envelope produced no typed event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("envelope type '{0}' is not an event")]
    NotAnEvent(String),

    #[error("event payload has no type tag")]
    MissingType,

    #[error("unrecognized event type '{0}'")]
    Unrecognized(String),

    #[error("malformed {kind} event: {reason}")]
    Malformed { kind: EventKind, reason: String },
}

/// A successfully typed event with the envelope metadata handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: Event,
    pub timestamp: Option<String>,
    pub request_id: Option<String>,
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

impl EventEnvelope {
    /// Type the payload: outer kind check, opcode lookup, then payload decode.
    pub fn decode(&self) -> Result<DecodedEvent, DecodeError> {
        if !self.is_event() {
            return Err(DecodeError::NotAnEvent(self.kind.clone()));
        }

        let tag = self
            .event
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingType)?;

        let kind: EventKind = tag
            .parse()
            .map_err(|_| DecodeError::Unrecognized(tag.to_owned()))?;

        let event: Event =
            serde_json::from_value(self.event.clone()).map_err(|e| DecodeError::Malformed {
                kind,
                reason: e.to_string(),
            })?;

        Ok(DecodedEvent {
            event,
            timestamp: self
                .event
                .get("timestamp")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            request_id: self.id.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    fn envelope(event: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            kind: "event".into(),
            gateway_id: Some("gw".into()),
            id: None,
            event,
        }
    }

    #[test]
    fn decodes_subnet_list() {
        let decoded = envelope(serde_json::json!({
            "type": "subnet_list",
            "timestamp": "2020-05-01T10:00:00Z",
            "subnetList": [{ "netIndex": 0 }, { "netIndex": 1, "netKey": "aa" }]
        }))
        .decode()
        .unwrap();

        assert_eq!(decoded.kind(), EventKind::SubnetList);
        assert_eq!(decoded.timestamp.as_deref(), Some("2020-05-01T10:00:00Z"));
        let Event::SubnetList(list) = decoded.event else {
            panic!("wrong variant");
        };
        assert_eq!(list.subnet_list.len(), 2);
        assert_eq!(list.subnet_list[1].net_key.as_deref(), Some("aa"));
    }

    #[test]
    fn failed_discovery_decodes_without_detail() {
        let decoded = envelope(serde_json::json!({
            "type": "node_discover_result",
            "error": 5,
            "status": 0,
            "address": 2
        }))
        .decode()
        .unwrap();

        let Event::NodeDiscoverResult(result) = decoded.event else {
            panic!("wrong variant");
        };
        assert!(!result.is_success());
        assert_eq!(result.detail.address, 2);
        assert!(result.detail.elements.is_empty());
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let err = envelope(serde_json::json!({ "type": "firmware_update", "progress": 10 }))
            .decode()
            .unwrap_err();
        assert_eq!(err, DecodeError::Unrecognized("firmware_update".into()));
    }

    #[test]
    fn known_type_with_bad_payload_is_malformed() {
        let err = envelope(serde_json::json!({ "type": "health_period" }))
            .decode()
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { kind: EventKind::HealthPeriod, .. }));
    }

    #[test]
    fn non_event_envelope_is_rejected() {
        let mut env = envelope(serde_json::json!({ "type": "subnet_list", "subnetList": [] }));
        env.kind = "operation".into();
        assert_eq!(env.decode().unwrap_err(), DecodeError::NotAnEvent("operation".into()));
    }

    #[test]
    fn missing_tag_is_reported() {
        let err = envelope(serde_json::json!({ "subnetList": [] })).decode().unwrap_err();
        assert_eq!(err, DecodeError::MissingType);
    }

    #[test]
    fn opcode_table_and_serde_tags_agree() {
        // Every kind must round-trip through the serde tag of its variant.
        for kind in EventKind::iter() {
            let tag: &'static str = kind.into();
            assert_eq!(tag, kind.to_string());
            assert_eq!(tag.parse::<EventKind>().unwrap(), kind);
        }
        let event = Event::HealthFaultsRegistered(RegisteredFaults { test_id: 0, faults: vec![] });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], EventKind::HealthFaultsRegistered.to_string());
    }

    #[test]
    fn unsolicited_kinds() {
        assert!(EventKind::ReceiveModelMessage.is_unsolicited());
        assert!(EventKind::HealthFaultsCurrent.is_unsolicited());
        assert!(!EventKind::HealthFaultsRegistered.is_unsolicited());
    }
}
