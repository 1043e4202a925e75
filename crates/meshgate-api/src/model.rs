//! Mesh domain entities as the gateway reports them.
//!
//! Field names follow the gateway's camelCase JSON. Everything that a
//! gateway may omit carries `#[serde(default)]` so a sparse report still
//! decodes; the fields the handlers key on (addresses, indexes) do not.

use serde::{Deserialize, Serialize};

/// Address the gateway itself occupies in every mesh network.
pub const GATEWAY_ADDRESS: u16 = 0x0001;

// ── Provisioning-side entities ───────────────────────────────────────

/// Unprovisioned device advertisement, as last heard by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    #[serde(default)]
    pub device_type: String,
    pub uuid: String,
    #[serde(default)]
    pub oob_info: String,
    #[serde(default)]
    pub uri_hash: u32,
}

/// A mesh subnet known to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub net_index: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_key: Option<String>,
}

impl Subnet {
    /// The primary subnet (index 0) cannot be removed from the gateway.
    pub fn is_primary(&self) -> bool {
        self.net_index == 0
    }
}

/// An application key bound to a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKey {
    pub app_index: u16,
    pub net_index: u16,
}

/// One row of the gateway's provisioned-node table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub address: u16,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub net_index: u16,
    #[serde(default)]
    pub element_count: u16,
}

impl NodeSummary {
    pub fn is_gateway(&self) -> bool {
        self.address == GATEWAY_ADDRESS
    }
}

/// A cloud-side address subscription (not a mesh model subscription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub address: u16,
}

// ── Node composition ─────────────────────────────────────────────────

/// Full configuration of one node, as returned by node discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeDetail {
    pub address: u16,
    pub uuid: String,
    pub cid: u16,
    pub pid: u16,
    pub vid: u16,
    pub crpl: u16,
    pub network_beacon_state: bool,
    pub time_to_live: u8,
    pub relay_feature: RelayFeature,
    pub proxy_feature: Feature,
    pub friend_feature: Feature,
    pub lpn_feature: LpnFeature,
    pub subnets: Vec<u16>,
    pub elements: Vec<Element>,
}

impl NodeDetail {
    /// The element whose address equals the node's unicast address.
    pub fn primary_element(&self) -> Option<&Element> {
        self.elements.iter().find(|e| e.address == self.address)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayFeature {
    pub support: bool,
    pub state: bool,
    pub retransmit_count: u8,
    pub retransmit_interval: u16,
}

/// Proxy and friend features share this shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    pub support: bool,
    pub state: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LpnFeature {
    pub state: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Element {
    pub address: u16,
    pub sig_models: Vec<SigModel>,
    pub vendor_models: Vec<VendorModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigModel {
    pub model_id: u16,
    #[serde(alias = "appKeyIndexes")]
    pub app_indexes: Vec<u16>,
    pub subscribe_addresses: Vec<u16>,
    pub publish_parameters: PublishParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorModel {
    pub model_id: u16,
    pub company_id: u16,
    /// Reported as `appIndex` for vendor models.
    #[serde(alias = "appIndex", alias = "appKeyIndexes")]
    pub app_indexes: Vec<u16>,
    pub subscribe_addresses: Vec<u16>,
    pub publish_parameters: PublishParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishParameters {
    pub address: u16,
    pub app_index: u16,
    pub friend_credential_flag: bool,
    pub time_to_live: u8,
    pub period: u8,
    pub period_units: String,
    pub retransmit_count: u8,
    pub retransmit_interval: u16,
}

// ── Operation results ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionResult {
    pub uuid: String,
    pub net_index: u16,
    pub address: u16,
    pub element_count: u16,
    pub error: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetResult {
    pub address: Option<u16>,
    pub error: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFault {
    pub fault: u8,
}

/// One byte of a model message payload, wrapped the way the gateway wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadByte {
    pub byte: u8,
}

impl From<u8> for PayloadByte {
    fn from(byte: u8) -> Self {
        Self { byte }
    }
}

/// Access-layer message received from a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMessage {
    pub net_index: u16,
    pub app_index: u16,
    pub source_address: u16,
    pub destination_address: u16,
    pub opcode: u32,
    #[serde(default)]
    pub payload: Vec<PayloadByte>,
}

impl ModelMessage {
    pub fn payload_bytes(&self) -> Vec<u8> {
        self.payload.iter().map(|b| b.byte).collect()
    }
}
