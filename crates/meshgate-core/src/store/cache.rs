// ── Replace-only reactive caches ──
//
// Each cache holds the last value its event handler wrote. Writes are
// wholesale replacements (never merges) and are crate-private, so only
// the dispatcher can produce them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use meshgate_api::model::NodeDetail;
use meshgate_api::wire::NodeDiscoverResult;

use crate::discovery::DiscoveryFailure;

/// The latest value of one domain, or `None` before the first response.
pub struct Cached<T> {
    value: watch::Sender<Option<Arc<T>>>,
    generation: AtomicU64,
}

/// A list-valued cache (beacons, subnets, app keys, nodes, subscriptions).
pub type SnapshotCache<T> = Cached<Vec<T>>;

impl<T: Send + Sync + 'static> Cached<T> {
    pub(crate) fn new() -> Self {
        let (value, _) = watch::channel(None);
        Self {
            value,
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn replace(&self, value: T) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        // `send_replace` updates even with zero receivers.
        self.value.send_replace(Some(Arc::new(value)));
    }

    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.value.borrow().clone()
    }

    pub fn is_populated(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Number of replacements so far this session.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn watch(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.value.subscribe()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn subscribe(&self) -> WatchStream<Option<Arc<T>>> {
        WatchStream::new(self.value.subscribe())
    }
}

// ── Node detail ──────────────────────────────────────────────────────

/// Outcome of the most recent node discovery.
pub type NodeOutcome = Result<Arc<NodeDetail>, DiscoveryFailure>;

/// Per-address node configuration plus the last discovery outcome.
///
/// Each address is replaced wholesale by its own discovery result.
pub struct NodeDetailCache {
    by_address: DashMap<u16, Arc<NodeDetail>>,
    last: Mutex<Option<NodeOutcome>>,
    generation: AtomicU64,
}

impl NodeDetailCache {
    pub(crate) fn new() -> Self {
        Self {
            by_address: DashMap::new(),
            last: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Store a discovery result. `expected` names the address that was
    /// asked about, for failures that omit it.
    pub(crate) fn record(&self, result: NodeDiscoverResult, expected: Option<u16>) -> NodeOutcome {
        let outcome = if result.is_success() {
            let detail = Arc::new(result.detail);
            self.by_address.insert(detail.address, Arc::clone(&detail));
            Ok(detail)
        } else {
            let address = match result.detail.address {
                0 => expected.unwrap_or_default(),
                address => address,
            };
            Err(DiscoveryFailure {
                address,
                error: result.error,
                status: result.status,
            })
        };

        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    pub fn get(&self, address: u16) -> Option<Arc<NodeDetail>> {
        self.by_address.get(&address).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, address: u16) -> bool {
        self.by_address.contains_key(&address)
    }

    /// All discovered nodes, ordered by address.
    pub fn snapshot(&self) -> Vec<Arc<NodeDetail>> {
        let mut nodes: Vec<_> = self.by_address.iter().map(|r| Arc::clone(r.value())).collect();
        nodes.sort_by_key(|n| n.address);
        nodes
    }

    pub fn last_outcome(&self) -> Option<NodeOutcome> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
