// ── Event dispatcher ──
//
// The single entry point for everything the receive loop delivers.
// Each event replaces exactly one cache, then either releases the gate,
// advances a discovery chain, or (for unsolicited traffic) fans out a
// notification. Never blocks, never fails upward.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;

use meshgate_api::wire::{DecodeError, Event, EventEnvelope, Operation, OperationEnvelope};
use meshgate_api::{Inbound, Publish};

use crate::discovery::{DiscoveryOrchestrator, Step};
use crate::gate::{CorrelationGate, SUBSCRIBE_REQUEST_ID};
use crate::notification::Notification;
use crate::store::NetworkState;

/// What the dispatcher did with one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A cache was replaced and the gate released.
    Released,
    /// A discovery step was published; the gate stays held.
    Advanced,
    /// A cache was replaced, but a running discovery owns the gate.
    Held,
    /// A cache was replaced, but nothing outstanding matched the event,
    /// so the gate was left as it was.
    Unmatched,
    /// Broadcast to notification listeners; the gate is untouched.
    Notified,
    /// Not an event envelope.
    Ignored,
    /// Unrecognized or malformed; dropped with a warning.
    Dropped,
}

pub struct EventDispatcher {
    state: Arc<NetworkState>,
    gate: Arc<CorrelationGate>,
    discovery: Arc<Mutex<DiscoveryOrchestrator>>,
    publisher: Arc<dyn Publish>,
    notifications: broadcast::Sender<Arc<Notification>>,
}

impl EventDispatcher {
    pub(crate) fn new(
        state: Arc<NetworkState>,
        gate: Arc<CorrelationGate>,
        discovery: Arc<Mutex<DiscoveryOrchestrator>>,
        publisher: Arc<dyn Publish>,
        notifications: broadcast::Sender<Arc<Notification>>,
    ) -> Self {
        Self {
            state,
            gate,
            discovery,
            publisher,
            notifications,
        }
    }

    /// Handle whatever the transport delivered.
    pub fn handle(&self, inbound: Inbound) -> Disposition {
        match inbound {
            Inbound::Subscribed => {
                if self.gate.release_matching(Some(SUBSCRIBE_REQUEST_ID)) {
                    tracing::info!("subscribed to gateway events");
                }
                Disposition::Ignored
            }
            Inbound::Event(envelope) => self.dispatch(&envelope),
            Inbound::Malformed { reason } => {
                tracing::warn!(%reason, "dropping malformed message");
                Disposition::Dropped
            }
        }
    }

    /// Route one envelope to its handler.
    pub fn dispatch(&self, envelope: &EventEnvelope) -> Disposition {
        let decoded = match envelope.decode() {
            Ok(decoded) => decoded,
            Err(DecodeError::NotAnEvent(kind)) => {
                tracing::debug!(%kind, "ignoring non-event envelope");
                return Disposition::Ignored;
            }
            Err(DecodeError::Unrecognized(event_type)) => {
                tracing::warn!(%event_type, "unrecognized event");
                return Disposition::Dropped;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed event");
                return Disposition::Dropped;
            }
        };

        self.state.last_event.replace(Utc::now());
        tracing::debug!(
            event_type = %decoded.kind(),
            request_id = decoded.request_id.as_deref(),
            "dispatching event"
        );

        let request_id = decoded.request_id;
        self.apply(decoded.event, request_id.as_deref())
    }

    fn apply(&self, event: Event, request_id: Option<&str>) -> Disposition {
        let state = &self.state;

        let step = match event {
            Event::BeaconList(list) => {
                state.beacons.replace(list.beacons);
                None
            }
            Event::SubnetList(list) => {
                state.subnets.replace(list.subnet_list);
                Some(self.discovery().on_subnets())
            }
            Event::AppKeyList(list) => {
                state.app_keys.replace(list.app_key_list);
                Some(self.discovery().on_app_keys())
            }
            Event::NodeList(list) => {
                let step = self
                    .discovery()
                    .on_nodes(&list.nodes, |address| state.node_details.contains(address));
                state.nodes.replace(list.nodes);
                Some(step)
            }
            Event::NodeDiscoverResult(result) => {
                let mut discovery = self.discovery();
                let target = discovery.current_target();
                let outcome = state.node_details.record(result, target);
                Some(discovery.on_node_discovered(outcome.map(|detail| detail.address)))
            }
            Event::ProvisionResult(result) => {
                state.provision.replace(result);
                None
            }
            Event::ResetResult(result) => {
                state.reset.replace(result);
                None
            }
            Event::SubscribeList(list) => {
                state.subscriptions.replace(list.address_list);
                None
            }
            Event::HealthFaultsRegistered(faults) => {
                state.health.registered_faults.replace(faults);
                None
            }
            Event::HealthPeriod(period) => {
                state.health.period_divisor.replace(period.divisor);
                None
            }
            Event::HealthAttention(attention) => {
                state.health.attention.replace(attention.attention);
                None
            }
            Event::HealthClientTimeout(timeout) => {
                state.health.client_timeout.replace(timeout.timeout);
                None
            }
            Event::ReceiveModelMessage(message) => {
                return self.notify(Notification::ModelMessage(message));
            }
            Event::HealthFaultsCurrent(faults) => {
                return self.notify(Notification::CurrentFaults(faults));
            }
        };

        match step {
            Some(Step::Issue(operation)) => self.continue_chain(operation),
            Some(Step::Finished) => self.release(request_id),
            Some(Step::Inactive) | None => {
                if self.discovery().is_active() {
                    tracing::debug!("discovery in progress, holding gate");
                    Disposition::Held
                } else {
                    self.release(request_id)
                }
            }
        }
    }

    fn release(&self, request_id: Option<&str>) -> Disposition {
        if self.gate.release_matching(request_id) {
            Disposition::Released
        } else {
            Disposition::Unmatched
        }
    }

    /// Publish the next discovery request under the chain's request id.
    fn continue_chain(&self, operation: Operation) -> Disposition {
        let envelope = match self.gate.outstanding_request() {
            Some(id) => OperationEnvelope::with_id(id, operation),
            None => OperationEnvelope::new(operation),
        };

        if let Err(e) = self.publisher.publish(&envelope) {
            tracing::warn!(error = %e, opcode = envelope.operation.opcode(), "discovery step publish failed");
            self.discovery().abort();
            self.gate.release();
            return Disposition::Released;
        }

        tracing::debug!(
            opcode = envelope.operation.opcode(),
            phase = ?self.discovery().phase(),
            "discovery advanced"
        );
        self.gate.advance();
        Disposition::Advanced
    }

    fn notify(&self, notification: Notification) -> Disposition {
        tracing::debug!(source = notification.source_address(), "notification received");
        // No receivers is fine; notifications are best effort.
        let _ = self.notifications.send(Arc::new(notification));
        Disposition::Notified
    }

    fn discovery(&self) -> MutexGuard<'_, DiscoveryOrchestrator> {
        self.discovery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use meshgate_api::Error;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OperationEnvelope>>,
    }

    impl Publish for Recorder {
        fn publish(&self, envelope: &OperationEnvelope) -> Result<(), Error> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: EventDispatcher,
        state: Arc<NetworkState>,
        gate: Arc<CorrelationGate>,
        discovery: Arc<Mutex<DiscoveryOrchestrator>>,
        recorder: Arc<Recorder>,
        notifications: broadcast::Receiver<Arc<Notification>>,
    }

    fn fixture() -> Fixture {
        let state = Arc::new(NetworkState::new());
        let gate = Arc::new(CorrelationGate::new(CancellationToken::new()));
        let discovery = Arc::new(Mutex::new(DiscoveryOrchestrator::new(true)));
        let recorder = Arc::new(Recorder::default());
        let (tx, notifications) = broadcast::channel(8);
        let dispatcher = EventDispatcher::new(
            Arc::clone(&state),
            Arc::clone(&gate),
            Arc::clone(&discovery),
            Arc::clone(&recorder) as Arc<dyn Publish>,
            tx,
        );
        Fixture {
            dispatcher,
            state,
            gate,
            discovery,
            recorder,
            notifications,
        }
    }

    fn event(payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            kind: "event".into(),
            gateway_id: Some("gw".into()),
            id: None,
            event: payload,
        }
    }

    #[tokio::test]
    async fn list_event_replaces_cache_and_releases() {
        let f = fixture();
        let held = f.gate.enter("r1").await.unwrap();

        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "app_key_list",
            "appKeyList": [{ "appIndex": 0, "netIndex": 0 }]
        })));

        assert_eq!(d, Disposition::Released);
        assert!(held.acquire(Duration::from_secs(1)).await);
        assert_eq!(f.state.app_keys.snapshot().unwrap().len(), 1);
        assert!(f.state.last_event.is_populated());
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_event_keeps_gate_held() {
        let f = fixture();
        let held = f.gate.enter("r1").await.unwrap();

        let d = f.dispatcher.dispatch(&event(serde_json::json!({ "type": "dfu_progress" })));
        assert_eq!(d, Disposition::Dropped);
        assert!(f.gate.is_outstanding());
        assert!(!held.acquire(Duration::from_secs(15)).await);
    }

    #[test]
    fn malformed_known_event_is_dropped() {
        let f = fixture();
        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "subnet_list",
            "subnetList": "not a list"
        })));
        assert_eq!(d, Disposition::Dropped);
        assert!(f.state.subnets.snapshot().is_none());
        assert!(f.state.last_event.snapshot().is_none());
    }

    #[test]
    fn response_with_nothing_outstanding_is_unmatched() {
        let f = fixture();
        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "subnet_list",
            "subnetList": [{ "netIndex": 0 }]
        })));
        assert_eq!(d, Disposition::Unmatched);
        assert!(!f.gate.is_outstanding());
        assert_eq!(f.state.subnets.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn non_event_envelopes_are_ignored() {
        let f = fixture();
        let mut envelope = event(serde_json::json!({ "type": "subnet_list", "subnetList": [] }));
        envelope.kind = "operation".into();
        assert_eq!(f.dispatcher.dispatch(&envelope), Disposition::Ignored);
        assert!(f.state.subnets.snapshot().is_none());
    }

    #[tokio::test]
    async fn model_messages_notify_without_release() {
        let mut f = fixture();
        let _held = f.gate.enter("r1").await.unwrap();

        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "receive_model_message",
            "netIndex": 0,
            "appIndex": 0,
            "sourceAddress": 2,
            "destinationAddress": 1,
            "opcode": 0x8204,
            "payload": [{ "byte": 1 }]
        })));

        assert_eq!(d, Disposition::Notified);
        assert!(f.gate.is_outstanding());
        let notification = f.notifications.try_recv().unwrap();
        assert_eq!(notification.source_address(), 2);
    }

    #[tokio::test]
    async fn subscribe_ack_only_releases_its_own_turn() {
        let f = fixture();
        let held = f.gate.enter("user-request").await.unwrap();
        f.dispatcher.handle(Inbound::Subscribed);
        assert!(f.gate.is_outstanding());
        drop(held);

        let pre_armed = f.gate.enter(SUBSCRIBE_REQUEST_ID).await.unwrap();
        f.dispatcher.handle(Inbound::Subscribed);
        assert!(pre_armed.acquire(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn chain_event_publishes_next_step_under_same_id() {
        let f = fixture();
        let first = f.discovery.lock().unwrap().start();
        assert_eq!(first, Operation::SubnetRequest);
        let _held = f.gate.enter("refresh-1").await.unwrap();

        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "subnet_list",
            "subnetList": [{ "netIndex": 0 }]
        })));

        assert_eq!(d, Disposition::Advanced);
        assert!(f.gate.is_outstanding());
        let sent = f.recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "refresh-1");
        assert_eq!(sent[0].operation, Operation::AppKeyRequest);
    }

    #[tokio::test]
    async fn stray_event_during_discovery_updates_cache_but_holds() {
        let f = fixture();
        f.discovery.lock().unwrap().start();
        let _held = f.gate.enter("refresh-1").await.unwrap();

        let d = f.dispatcher.dispatch(&event(serde_json::json!({
            "type": "beacon_list",
            "beacons": [{ "uuid": "00112233445566778899aabbccddeeff" }]
        })));

        assert_eq!(d, Disposition::Held);
        assert!(f.gate.is_outstanding());
        assert_eq!(f.state.beacons.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn echoed_id_must_match() {
        let f = fixture();
        let _held = f.gate.enter("mine").await.unwrap();
        let mut envelope = event(serde_json::json!({ "type": "health_period", "divisor": 3 }));
        envelope.id = Some("someone-else".into());

        assert_eq!(f.dispatcher.dispatch(&envelope), Disposition::Unmatched);
        assert!(f.gate.is_outstanding());
        assert_eq!(*f.state.health.period_divisor.snapshot().unwrap(), 3);
    }
}
