// ── Discovery orchestrator ──
//
// Chains subnet list -> app key list -> node list -> one node_discover
// per undiscovered node into a single logical request. The dispatcher
// drives the transitions from the receive loop; the caller that started
// the chain keeps the gate for the whole run.

use std::collections::BTreeSet;

use serde::Serialize;

use meshgate_api::model::{GATEWAY_ADDRESS, NodeSummary};
use meshgate_api::wire::Operation;

/// A node whose discovery the gateway reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscoveryFailure {
    pub address: u16,
    pub error: i64,
    pub status: i64,
}

impl DiscoveryFailure {
    /// The non-zero code to surface, error first.
    pub fn code(&self) -> i64 {
        if self.error != 0 { self.error } else { self.status }
    }
}

/// What one discovery run found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub discovered: Vec<u16>,
    pub failed: Vec<DiscoveryFailure>,
}

/// Observable position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DiscoveryPhase {
    Idle,
    Subnets,
    AppKeys,
    Nodes,
    NodeDetail { index: usize, total: usize },
    Done,
}

/// What the dispatcher should do after feeding an event to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Publish this as the next request of the chain; keep the gate.
    Issue(Operation),
    /// The chain is complete; release the gate.
    Finished,
    /// The event is not part of a running chain.
    Inactive,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Subnets,
    AppKeys,
    Nodes,
    NodeDetail { queue: Vec<u16>, index: usize },
    Done,
}

#[derive(Debug)]
pub struct DiscoveryOrchestrator {
    phase: Phase,
    rediscover_new_nodes: bool,
    /// Addresses that failed in the last run; not retried by re-entry,
    /// only by the next full refresh.
    failed: BTreeSet<u16>,
    report: DiscoveryReport,
}

impl DiscoveryOrchestrator {
    pub fn new(rediscover_new_nodes: bool) -> Self {
        Self {
            phase: Phase::Idle,
            rediscover_new_nodes,
            failed: BTreeSet::new(),
            report: DiscoveryReport::default(),
        }
    }

    /// Begin a run; returns the first request to publish.
    pub fn start(&mut self) -> Operation {
        if self.is_active() {
            tracing::warn!(phase = ?self.phase(), "restarting discovery mid-run");
        }
        self.phase = Phase::Subnets;
        self.failed.clear();
        self.report = DiscoveryReport::default();
        tracing::info!("network discovery started");
        Operation::SubnetRequest
    }

    pub fn on_subnets(&mut self) -> Step {
        if !matches!(self.phase, Phase::Subnets) {
            return Step::Inactive;
        }
        self.phase = Phase::AppKeys;
        Step::Issue(Operation::AppKeyRequest)
    }

    pub fn on_app_keys(&mut self) -> Step {
        if !matches!(self.phase, Phase::AppKeys) {
            return Step::Inactive;
        }
        self.phase = Phase::Nodes;
        Step::Issue(Operation::NodeRequest)
    }

    /// Compute undiscovered nodes from a fresh node list.
    ///
    /// Also re-enters a finished run when new nodes show up, if enabled.
    pub fn on_nodes(&mut self, nodes: &[NodeSummary], known: impl Fn(u16) -> bool) -> Step {
        let reentry = matches!(self.phase, Phase::Done) && self.rediscover_new_nodes;
        if !matches!(self.phase, Phase::Nodes) && !reentry {
            return Step::Inactive;
        }

        let pending: BTreeSet<u16> = nodes
            .iter()
            .map(|n| n.address)
            .filter(|&a| a != GATEWAY_ADDRESS && !known(a))
            .filter(|a| !(reentry && self.failed.contains(a)))
            .collect();

        if pending.is_empty() {
            if reentry {
                return Step::Inactive;
            }
            return self.finish();
        }

        let queue: Vec<u16> = pending.into_iter().collect();
        tracing::info!(count = queue.len(), reentry, "discovering nodes");
        let first = queue[0];
        self.phase = Phase::NodeDetail { queue, index: 0 };
        Step::Issue(Operation::NodeDiscover { address: first })
    }

    /// Account for one node's discovery result and move to the next node.
    pub fn on_node_discovered(&mut self, outcome: Result<u16, DiscoveryFailure>) -> Step {
        let Phase::NodeDetail { queue, index } = &mut self.phase else {
            return Step::Inactive;
        };

        match outcome {
            Ok(address) => self.report.discovered.push(address),
            Err(failure) => {
                tracing::warn!(
                    address = failure.address,
                    error = failure.error,
                    status = failure.status,
                    "node discovery failed, continuing"
                );
                self.failed.insert(failure.address);
                self.report.failed.push(failure);
            }
        }

        *index += 1;
        let next = queue.get(*index).copied();
        match next {
            Some(address) => Step::Issue(Operation::NodeDiscover { address }),
            None => self.finish(),
        }
    }

    /// The address the running chain is waiting on, if any.
    pub fn current_target(&self) -> Option<u16> {
        match &self.phase {
            Phase::NodeDetail { queue, index } => queue.get(*index).copied(),
            _ => None,
        }
    }

    /// Drop back to idle so stray late events cannot resume the chain.
    pub fn abort(&mut self) {
        if self.is_active() {
            tracing::warn!(phase = ?self.phase(), "network discovery aborted");
        }
        self.phase = Phase::Idle;
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Done)
    }

    pub fn phase(&self) -> DiscoveryPhase {
        match &self.phase {
            Phase::Idle => DiscoveryPhase::Idle,
            Phase::Subnets => DiscoveryPhase::Subnets,
            Phase::AppKeys => DiscoveryPhase::AppKeys,
            Phase::Nodes => DiscoveryPhase::Nodes,
            Phase::NodeDetail { queue, index } => DiscoveryPhase::NodeDetail {
                index: *index,
                total: queue.len(),
            },
            Phase::Done => DiscoveryPhase::Done,
        }
    }

    pub fn take_report(&mut self) -> DiscoveryReport {
        std::mem::take(&mut self.report)
    }

    fn finish(&mut self) -> Step {
        tracing::info!(
            discovered = self.report.discovered.len(),
            failed = self.report.failed.len(),
            "network discovery finished"
        );
        self.phase = Phase::Done;
        Step::Finished
    }
}
