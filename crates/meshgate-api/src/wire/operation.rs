use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::PayloadByte;

/// Everything the gateway can be asked to do.
///
/// Serialized with the opcode in `type` and camelCase fields, exactly
/// as the gateway firmware expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Operation {
    // ── Beacons ──────────────────────────────────────────────────────
    BeaconRequest,

    // ── Subnets ──────────────────────────────────────────────────────
    SubnetRequest,
    SubnetAdd {
        net_key: String,
        net_index: u16,
    },
    SubnetGenerate {
        net_index: u16,
    },
    SubnetDelete {
        net_index: u16,
    },

    // ── Application keys ─────────────────────────────────────────────
    AppKeyRequest,
    AppKeyAdd {
        app_key: String,
        app_index: u16,
        net_index: u16,
    },
    AppKeyGenerate {
        app_index: u16,
        net_index: u16,
    },
    AppKeyDelete {
        app_index: u16,
    },

    // ── Nodes ────────────────────────────────────────────────────────
    NodeRequest,
    NodeDiscover {
        address: u16,
    },
    NodeConfigure {
        node_address: u16,
        #[serde(flatten)]
        configuration: NodeConfiguration,
    },
    Provision {
        uuid: String,
        net_index: u16,
        address: u16,
        attention: u8,
    },

    // ── Cloud subscriptions ──────────────────────────────────────────
    Subscribe {
        address_list: Vec<AddressEntry>,
    },
    Unsubscribe {
        address_list: Vec<AddressEntry>,
    },
    SubscribeListRequest,

    // ── Access layer ─────────────────────────────────────────────────
    SendModelMessage {
        net_index: u16,
        app_index: u16,
        address: u16,
        opcode: u32,
        payload: Vec<PayloadByte>,
    },

    // ── Health client ────────────────────────────────────────────────
    HealthFaultGet {
        address: u16,
        app_index: u16,
        company_id: u16,
    },
    HealthFaultClear {
        address: u16,
        app_index: u16,
        company_id: u16,
    },
    HealthFaultTest {
        address: u16,
        app_index: u16,
        company_id: u16,
        test_id: u8,
    },
    HealthPeriodGet {
        address: u16,
        app_index: u16,
    },
    HealthPeriodSet {
        address: u16,
        app_index: u16,
        divisor: u8,
    },
    HealthAttentionGet {
        address: u16,
        app_index: u16,
    },
    HealthAttentionSet {
        address: u16,
        app_index: u16,
        attention: u8,
    },
    HealthClientTimeoutGet,
    HealthClientTimeoutSet {
        timeout: u32,
    },
}

impl Operation {
    /// The opcode string that goes on the wire.
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::BeaconRequest => "beacon_request",
            Self::SubnetRequest => "subnet_request",
            Self::SubnetAdd { .. } => "subnet_add",
            Self::SubnetGenerate { .. } => "subnet_generate",
            Self::SubnetDelete { .. } => "subnet_delete",
            Self::AppKeyRequest => "app_key_request",
            Self::AppKeyAdd { .. } => "app_key_add",
            Self::AppKeyGenerate { .. } => "app_key_generate",
            Self::AppKeyDelete { .. } => "app_key_delete",
            Self::NodeRequest => "node_request",
            Self::NodeDiscover { .. } => "node_discover",
            Self::NodeConfigure { .. } => "node_configure",
            Self::Provision { .. } => "provision",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SubscribeListRequest => "subscribe_list_request",
            Self::SendModelMessage { .. } => "send_model_message",
            Self::HealthFaultGet { .. } => "health_fault_get",
            Self::HealthFaultClear { .. } => "health_fault_clear",
            Self::HealthFaultTest { .. } => "health_fault_test",
            Self::HealthPeriodGet { .. } => "health_period_get",
            Self::HealthPeriodSet { .. } => "health_period_set",
            Self::HealthAttentionGet { .. } => "health_attention_get",
            Self::HealthAttentionSet { .. } => "health_attention_set",
            Self::HealthClientTimeoutGet => "health_client_timeout_get",
            Self::HealthClientTimeoutSet { .. } => "health_client_timeout_set",
        }
    }

    pub fn subscribe(addresses: impl IntoIterator<Item = u16>) -> Self {
        Self::Subscribe {
            address_list: addresses.into_iter().map(AddressEntry::from).collect(),
        }
    }

    pub fn unsubscribe(addresses: impl IntoIterator<Item = u16>) -> Self {
        Self::Unsubscribe {
            address_list: addresses.into_iter().map(AddressEntry::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: u16,
}

impl From<u16> for AddressEntry {
    fn from(address: u16) -> Self {
        Self { address }
    }
}

// ── Node configuration ───────────────────────────────────────────────

/// Configuration-server changes carried by `node_configure`.
///
/// Flattened into the operation, so the variant name lands in a
/// sibling `configuration` field next to `nodeAddress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "configuration",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum NodeConfiguration {
    NetworkBeaconSet {
        state: bool,
    },
    TimeToLiveSet {
        value: u8,
    },
    RelayFeatureSet {
        state: bool,
        retransmit_count: u8,
        retransmit_interval: u16,
    },
    ProxyFeatureSet {
        state: bool,
    },
    FriendFeatureSet {
        state: bool,
    },
    SubnetAdd {
        net_index: u16,
    },
    SubnetDelete {
        net_index: u16,
    },
    AppKeyBind {
        element_address: u16,
        model_id: u16,
        app_index: u16,
    },
    AppKeyUnbind {
        element_address: u16,
        model_id: u16,
        app_index: u16,
    },
    PublishParametersSet {
        element_address: u16,
        model_id: u16,
        publish_address: u16,
        app_index: u16,
        friend_credential_flag: bool,
        time_to_live: u8,
        period: u8,
        period_units: PeriodUnits,
        retransmit_count: u8,
        retransmit_interval: u16,
    },
    SubscribeAddressAdd {
        element_address: u16,
        model_id: u16,
        subscribe_address: u16,
    },
    SubscribeAddressDelete {
        element_address: u16,
        model_id: u16,
        subscribe_address: u16,
    },
    SubscribeAddressOverwrite {
        element_address: u16,
        model_id: u16,
        subscribe_address: u16,
    },
}

/// Resolution of a model's publish period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PeriodUnits {
    #[serde(rename = "100ms")]
    #[strum(serialize = "100ms")]
    Millis100,
    #[serde(rename = "1s")]
    #[strum(serialize = "1s")]
    Seconds1,
    #[serde(rename = "10s")]
    #[strum(serialize = "10s")]
    Seconds10,
    #[serde(rename = "10m")]
    #[strum(serialize = "10m")]
    Minutes10,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unit_operation_is_bare_type() {
        assert_eq!(
            serde_json::to_value(Operation::BeaconRequest).unwrap(),
            serde_json::json!({ "type": "beacon_request" })
        );
    }

    #[test]
    fn fields_are_camel_case() {
        let op = Operation::AppKeyAdd {
            app_key: "00112233445566778899aabbccddeeff".into(),
            app_index: 1,
            net_index: 0,
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({
                "type": "app_key_add",
                "appKey": "00112233445566778899aabbccddeeff",
                "appIndex": 1,
                "netIndex": 0
            })
        );
    }

    #[test]
    fn node_configure_flattens_configuration() {
        let op = Operation::NodeConfigure {
            node_address: 0x0002,
            configuration: NodeConfiguration::SubscribeAddressDelete {
                element_address: 0x0003,
                model_id: 0x1000,
                subscribe_address: 0xc000,
            },
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({
                "type": "node_configure",
                "nodeAddress": 2,
                "configuration": "subscribeAddressDelete",
                "elementAddress": 3,
                "modelId": 4096,
                "subscribeAddress": 49152
            })
        );
    }

    #[test]
    fn publish_parameters_use_unit_strings() {
        let cfg = NodeConfiguration::PublishParametersSet {
            element_address: 2,
            model_id: 0x1001,
            publish_address: 0xc001,
            app_index: 0,
            friend_credential_flag: false,
            time_to_live: 7,
            period: 10,
            period_units: PeriodUnits::Seconds1,
            retransmit_count: 1,
            retransmit_interval: 50,
        };
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["configuration"], "publishParametersSet");
        assert_eq!(value["periodUnits"], "1s");
        assert_eq!(value["friendCredentialFlag"], false);
        assert_eq!("10m".parse::<PeriodUnits>().unwrap(), PeriodUnits::Minutes10);
    }

    #[test]
    fn subscribe_wraps_addresses() {
        let op = Operation::subscribe([0xc000, 0xc001]);
        assert_eq!(op.opcode(), "subscribe");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({
                "type": "subscribe",
                "addressList": [{ "address": 49152 }, { "address": 49153 }]
            })
        );
    }

    #[test]
    fn opcode_agrees_with_serialized_tag() {
        let ops = [
            Operation::HealthClientTimeoutSet { timeout: 30 },
            Operation::HealthFaultTest { address: 2, app_index: 0, company_id: 0x59, test_id: 0 },
            Operation::NodeDiscover { address: 2 },
            Operation::SubscribeListRequest,
        ];
        for op in ops {
            let value = serde_json::to_value(&op).unwrap();
            assert_eq!(value["type"], op.opcode());
        }
    }
}
