// meshgate-api: Wire protocol and transports for nRF Cloud Bluetooth mesh gateways

pub mod account;
pub mod error;
pub mod model;
pub mod mqtt;
pub mod transport;
pub mod wire;

pub use account::{AccountClient, AccountInfo, DEFAULT_API_URL, DeviceMeta, DeviceSummary};
pub use error::Error;
pub use mqtt::{GatewayTopics, MqttConfig, MqttTransport, ReceiveLoop};
pub use transport::{Inbound, Publish, ReconnectConfig, TlsFiles, TlsMaterial, calculate_backoff};
pub use wire::{
    DecodeError, DecodedEvent, Event, EventEnvelope, EventKind, NodeConfiguration, Operation,
    OperationEnvelope, PeriodUnits,
};
