// ── Network state ──
//
// Every cache the dispatcher writes, owned by the session and shared
// with the dispatcher by `Arc`.

mod cache;

use chrono::{DateTime, Utc};

use meshgate_api::model::{
    AppKey, Beacon, NodeSummary, ProvisionResult, ResetResult, Subnet, Subscription,
};
use meshgate_api::wire::RegisteredFaults;

pub use cache::{Cached, NodeDetailCache, NodeOutcome, SnapshotCache};

/// Results of health client requests.
pub struct HealthState {
    pub registered_faults: Cached<RegisteredFaults>,
    pub period_divisor: Cached<u8>,
    pub attention: Cached<u8>,
    pub client_timeout: Cached<u32>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            registered_faults: Cached::new(),
            period_divisor: Cached::new(),
            attention: Cached::new(),
            client_timeout: Cached::new(),
        }
    }
}

/// The session's view of the mesh network.
pub struct NetworkState {
    pub beacons: SnapshotCache<Beacon>,
    pub subnets: SnapshotCache<Subnet>,
    pub app_keys: SnapshotCache<AppKey>,
    pub nodes: SnapshotCache<NodeSummary>,
    pub subscriptions: SnapshotCache<Subscription>,
    pub node_details: NodeDetailCache,
    pub provision: Cached<ProvisionResult>,
    pub reset: Cached<ResetResult>,
    pub health: HealthState,
    /// When the last event was dispatched.
    pub last_event: Cached<DateTime<Utc>>,
}

impl NetworkState {
    pub(crate) fn new() -> Self {
        Self {
            beacons: Cached::new(),
            subnets: Cached::new(),
            app_keys: Cached::new(),
            nodes: Cached::new(),
            subscriptions: Cached::new(),
            node_details: NodeDetailCache::new(),
            provision: Cached::new(),
            reset: Cached::new(),
            health: HealthState::new(),
            last_event: Cached::new(),
        }
    }
}
