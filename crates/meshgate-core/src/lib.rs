//! Request/response correlation over a fire-and-forget gateway channel.
//!
//! The gateway answers operations with events on a separate topic, with
//! no request ids to match them by. This crate turns that into ordered
//! request/response pairs:
//!
//! - **[`Session`]**: the command layer. [`connect()`](Session::connect)
//!   resolves the broker, starts the receive loop and waits for the
//!   subscription; every command then takes the gate, publishes, waits,
//!   and returns the snapshot the answering event produced.
//!
//! - **[`CorrelationGate`]**: at most one request outstanding, with a
//!   bounded wait. The receive loop releases it without ever blocking.
//!
//! - **[`EventDispatcher`]**: one handler per event type. Each handler
//!   replaces one cache and releases the gate; unknown and malformed
//!   events are dropped and never release.
//!
//! - **[`NetworkState`]**: replace-only caches (`watch` channels, plus a
//!   `DashMap` for per-node configuration) written only by the dispatcher.
//!
//! - **[`DiscoveryOrchestrator`]**: chains subnet, app key, node and
//!   per-node discovery requests into one refresh while holding the gate.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod message;
pub mod notification;
pub mod select;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_TIMEOUT, Endpoint, SessionConfig};
pub use discovery::{DiscoveryFailure, DiscoveryOrchestrator, DiscoveryPhase, DiscoveryReport};
pub use dispatch::{Disposition, EventDispatcher};
pub use error::CoreError;
pub use gate::{CorrelationGate, Outstanding, SUBSCRIBE_REQUEST_ID, Wake};
pub use message::{OnOffPayload, OnOffStatus, Transition};
pub use notification::Notification;
pub use select::{Choice, Chooser, Labelled};
pub use session::Session;
pub use store::{Cached, HealthState, NetworkState, NodeDetailCache, NodeOutcome, SnapshotCache};

// Domain types callers need alongside the session.
pub use meshgate_api::model::{
    AppKey, Beacon, GATEWAY_ADDRESS, ModelMessage, NodeDetail, NodeSummary, ProvisionResult,
    Subnet, Subscription,
};
pub use meshgate_api::wire::{NodeConfiguration, Operation, PeriodUnits, RegisteredFaults};
pub use meshgate_api::{ReconnectConfig, TlsFiles};
