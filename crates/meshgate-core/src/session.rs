// ── Session ──
//
// One connection to one gateway. Owns the gate, the caches, the
// orchestrator and the receive loop. Every command takes the gate's
// single turn, publishes, waits for the dispatcher to release it, then
// reads the cache the matching event replaced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use meshgate_api::model::{
    AppKey, Beacon, NodeDetail, NodeSummary, PayloadByte, ProvisionResult, Subnet, Subscription,
};
use meshgate_api::wire::{NodeConfiguration, Operation, OperationEnvelope, RegisteredFaults};
use meshgate_api::{AccountClient, GatewayTopics, MqttConfig, MqttTransport, Publish, ReceiveLoop};

use crate::config::{Endpoint, SessionConfig};
use crate::discovery::{DiscoveryOrchestrator, DiscoveryPhase, DiscoveryReport};
use crate::dispatch::EventDispatcher;
use crate::error::CoreError;
use crate::gate::{CorrelationGate, SUBSCRIBE_REQUEST_ID, Wake};
use crate::notification::Notification;
use crate::select::{Choice, Chooser, Labelled};
use crate::store::{Cached, NetworkState};

const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// A live gateway session.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Clones share the same
/// gate, so commands issued from any clone are serialized.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    state: Arc<NetworkState>,
    gate: Arc<CorrelationGate>,
    discovery: Arc<Mutex<DiscoveryOrchestrator>>,
    dispatcher: Arc<EventDispatcher>,
    publisher: Arc<dyn Publish>,
    notifications: broadcast::Sender<Arc<Notification>>,
    cancel: CancellationToken,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Wire a session to an arbitrary publisher. Inbound traffic must be
    /// fed to [`dispatcher()`](Self::dispatcher) by the caller.
    pub fn new(config: SessionConfig, publisher: Arc<dyn Publish>) -> Self {
        let cancel = CancellationToken::new();
        let state = Arc::new(NetworkState::new());
        let gate = Arc::new(CorrelationGate::new(cancel.clone()));
        let discovery = Arc::new(Mutex::new(DiscoveryOrchestrator::new(
            config.rediscover_new_nodes,
        )));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&state),
            Arc::clone(&gate),
            Arc::clone(&discovery),
            Arc::clone(&publisher),
            notifications.clone(),
        ));

        Self {
            inner: Arc::new(SessionInner {
                config,
                state,
                gate,
                discovery,
                dispatcher,
                publisher,
                notifications,
                cancel,
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Resolve the broker, connect over MQTT and wait for the events
    /// subscription to be acknowledged.
    pub async fn connect(config: SessionConfig) -> Result<Self, CoreError> {
        let mqtt = resolve_mqtt_config(&config).await?;
        let endpoint = format!("{}:{}", mqtt.host, mqtt.port);
        let (transport, receive) = MqttTransport::connect(mqtt).await?;

        let session = Self::new(config, Arc::new(transport));
        session.start(receive, &endpoint).await?;

        if session.inner.config.discover_on_connect {
            let report = session.refresh_network().await?;
            tracing::info!(
                discovered = report.discovered.len(),
                failed = report.failed.len(),
                "initial discovery complete"
            );
        }
        Ok(session)
    }

    /// Pre-arm the gate for the subscribe acknowledgment, then start
    /// the receive loop that will release it.
    async fn start(&self, receive: ReceiveLoop, endpoint: &str) -> Result<(), CoreError> {
        let inner = &self.inner;
        let held = inner
            .gate
            .enter(SUBSCRIBE_REQUEST_ID)
            .await
            .ok_or(CoreError::Cancelled)?;

        let dispatcher = Arc::clone(&inner.dispatcher);
        let cancel = inner.cancel.clone();
        let handle = tokio::spawn(async move {
            let result = receive
                .run(cancel.clone(), |inbound| {
                    dispatcher.handle(inbound);
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "receive loop stopped, ending session");
                cancel.cancel();
            }
        });
        inner.task_handles.lock().await.push(handle);

        match held.wait(inner.config.timeout).await {
            Wake::Released => {
                tracing::info!(gateway = %inner.config.gateway_id, "session ready");
                Ok(())
            }
            Wake::TimedOut => {
                inner.cancel.cancel();
                Err(CoreError::ConnectionFailed {
                    endpoint: endpoint.to_owned(),
                    reason: format!(
                        "no subscription acknowledgment within {}s",
                        inner.config.timeout.as_secs()
                    ),
                })
            }
            Wake::Cancelled => Err(CoreError::ConnectionFailed {
                endpoint: endpoint.to_owned(),
                reason: "connection closed before the subscription was acknowledged".into(),
            }),
        }
    }

    /// Cancel the session and join the receive loop. Every waiter wakes
    /// with [`CoreError::Cancelled`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        tracing::debug!("session shut down");
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &Arc<NetworkState> {
        &self.inner.state
    }

    pub fn gate(&self) -> &CorrelationGate {
        &self.inner.gate
    }

    /// The receive-side entry point for inbound traffic.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Inbound model messages and current-fault reports.
    pub fn notifications(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.inner.notifications.subscribe()
    }

    pub fn discovery_phase(&self) -> DiscoveryPhase {
        self.discovery().phase()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await;
    }

    // ── Request primitives ───────────────────────────────────────────

    /// Publish `operation` and wait for whatever event releases the gate.
    pub async fn request(&self, operation: Operation) -> Result<(), CoreError> {
        self.turn(vec![operation], |_| None).await
    }

    /// Publish without waiting for an answer. Still waits for its turn.
    pub async fn post(&self, operation: Operation) -> Result<(), CoreError> {
        let envelope = OperationEnvelope::new(operation);
        let _held = self
            .inner
            .gate
            .enter(envelope.id.clone())
            .await
            .ok_or(CoreError::Cancelled)?;
        self.inner.publisher.publish(&envelope)?;
        Ok(())
    }

    /// Take the gate, publish every operation under one request id, and
    /// wait for a release.
    ///
    /// `probe` reads a generation counter. When it returns `Some`, the
    /// counter must have moved by the time the gate is released, or the
    /// release came from an unrelated event.
    async fn turn<P>(&self, operations: Vec<Operation>, probe: P) -> Result<(), CoreError>
    where
        P: Fn(&NetworkState) -> Option<u64> + Send + Sync,
    {
        let inner = &self.inner;
        let Some(opcode) = operations.last().map(Operation::opcode) else {
            return Ok(());
        };
        let timeout = inner.config.timeout;

        let request_id = Uuid::new_v4().to_string();
        let held = inner
            .gate
            .enter(request_id.clone())
            .await
            .ok_or(CoreError::Cancelled)?;
        let before = probe(&inner.state);

        for operation in operations {
            let envelope = OperationEnvelope::with_id(request_id.clone(), operation);
            inner.publisher.publish(&envelope)?;
        }

        match held.wait(timeout).await {
            Wake::Released => {}
            Wake::TimedOut => return Err(CoreError::timeout(opcode, timeout)),
            Wake::Cancelled => return Err(CoreError::Cancelled),
        }

        if before.is_some() && probe(&inner.state) == before {
            tracing::warn!(opcode, request_id = %request_id, "released by an unrelated event");
            return Err(CoreError::UnexpectedResponse { operation: opcode });
        }
        Ok(())
    }

    /// One round trip whose answer replaces `cache`; returns the new value.
    async fn fetch<T, F>(&self, operations: Vec<Operation>, cache: F) -> Result<Arc<T>, CoreError>
    where
        T: Send + Sync + 'static,
        F: Fn(&NetworkState) -> &Cached<T> + Send + Sync,
    {
        let opcode = operations.last().map_or("request", Operation::opcode);
        self.turn(operations, |state| Some(cache(state).generation()))
            .await?;
        cache(&self.inner.state)
            .snapshot()
            .ok_or(CoreError::UnexpectedResponse { operation: opcode })
    }

    // ── Domain lists ─────────────────────────────────────────────────

    pub async fn beacons(&self) -> Result<Arc<Vec<Beacon>>, CoreError> {
        self.fetch(vec![Operation::BeaconRequest], |s| &s.beacons)
            .await
    }

    pub async fn subnets(&self) -> Result<Arc<Vec<Subnet>>, CoreError> {
        self.fetch(vec![Operation::SubnetRequest], |s| &s.subnets)
            .await
    }

    pub async fn app_keys(&self) -> Result<Arc<Vec<AppKey>>, CoreError> {
        self.fetch(vec![Operation::AppKeyRequest], |s| &s.app_keys)
            .await
    }

    pub async fn nodes(&self) -> Result<Arc<Vec<NodeSummary>>, CoreError> {
        self.fetch(vec![Operation::NodeRequest], |s| &s.nodes).await
    }

    pub async fn subscriptions(&self) -> Result<Arc<Vec<Subscription>>, CoreError> {
        self.fetch(vec![Operation::SubscribeListRequest], |s| {
            &s.subscriptions
        })
        .await
    }

    // ── Subnets and application keys ─────────────────────────────────

    pub async fn add_subnet(
        &self,
        net_key: impl Into<String>,
        net_index: u16,
    ) -> Result<Arc<Vec<Subnet>>, CoreError> {
        let operation = Operation::SubnetAdd {
            net_key: net_key.into(),
            net_index,
        };
        self.fetch(vec![operation], |s| &s.subnets).await
    }

    pub async fn generate_subnet(&self, net_index: u16) -> Result<Arc<Vec<Subnet>>, CoreError> {
        self.fetch(vec![Operation::SubnetGenerate { net_index }], |s| {
            &s.subnets
        })
        .await
    }

    pub async fn delete_subnet(&self, net_index: u16) -> Result<Arc<Vec<Subnet>>, CoreError> {
        if net_index == 0 {
            return Err(CoreError::ValidationFailed {
                message: "the primary subnet (0x0000) cannot be deleted".into(),
            });
        }
        self.fetch(vec![Operation::SubnetDelete { net_index }], |s| {
            &s.subnets
        })
        .await
    }

    pub async fn add_app_key(
        &self,
        app_key: impl Into<String>,
        app_index: u16,
        net_index: u16,
    ) -> Result<Arc<Vec<AppKey>>, CoreError> {
        let operation = Operation::AppKeyAdd {
            app_key: app_key.into(),
            app_index,
            net_index,
        };
        self.fetch(vec![operation], |s| &s.app_keys).await
    }

    pub async fn generate_app_key(
        &self,
        app_index: u16,
        net_index: u16,
    ) -> Result<Arc<Vec<AppKey>>, CoreError> {
        let operation = Operation::AppKeyGenerate {
            app_index,
            net_index,
        };
        self.fetch(vec![operation], |s| &s.app_keys).await
    }

    pub async fn delete_app_key(&self, app_index: u16) -> Result<Arc<Vec<AppKey>>, CoreError> {
        self.fetch(vec![Operation::AppKeyDelete { app_index }], |s| {
            &s.app_keys
        })
        .await
    }

    // ── Cloud subscriptions ──────────────────────────────────────────

    pub async fn subscribe(&self, addresses: &[u16]) -> Result<Arc<Vec<Subscription>>, CoreError> {
        let operation = Operation::subscribe(addresses.iter().copied());
        self.fetch(vec![operation], |s| &s.subscriptions).await
    }

    pub async fn unsubscribe(
        &self,
        addresses: &[u16],
    ) -> Result<Arc<Vec<Subscription>>, CoreError> {
        let operation = Operation::unsubscribe(addresses.iter().copied());
        self.fetch(vec![operation], |s| &s.subscriptions).await
    }

    // ── Nodes ────────────────────────────────────────────────────────

    /// Fetch one node's full configuration.
    pub async fn discover_node(&self, address: u16) -> Result<Arc<NodeDetail>, CoreError> {
        self.node_round_trip(Operation::NodeDiscover { address })
            .await
    }

    /// Apply a configuration change; the gateway answers with the node's
    /// updated configuration.
    pub async fn configure_node(
        &self,
        address: u16,
        configuration: NodeConfiguration,
    ) -> Result<Arc<NodeDetail>, CoreError> {
        self.node_round_trip(Operation::NodeConfigure {
            node_address: address,
            configuration,
        })
        .await
    }

    async fn node_round_trip(&self, operation: Operation) -> Result<Arc<NodeDetail>, CoreError> {
        let opcode = operation.opcode();
        self.turn(vec![operation], |s| Some(s.node_details.generation()))
            .await?;

        match self.inner.state.node_details.last_outcome() {
            Some(Ok(detail)) => Ok(detail),
            Some(Err(failure)) => Err(CoreError::GatewayRejected {
                operation: opcode,
                code: failure.code(),
            }),
            None => Err(CoreError::UnexpectedResponse { operation: opcode }),
        }
    }

    pub async fn provision(
        &self,
        uuid: impl Into<String>,
        net_index: u16,
        address: u16,
        attention: u8,
    ) -> Result<Arc<ProvisionResult>, CoreError> {
        let operation = Operation::Provision {
            uuid: uuid.into(),
            net_index,
            address,
            attention,
        };
        let result = self.fetch(vec![operation], |s| &s.provision).await?;
        if result.error != 0 {
            return Err(CoreError::GatewayRejected {
                operation: "provision",
                code: result.error,
            });
        }
        tracing::info!(
            address = result.address,
            elements = result.element_count,
            "node provisioned"
        );
        Ok(result)
    }

    // ── Health client ────────────────────────────────────────────────

    pub async fn registered_faults(
        &self,
        address: u16,
        app_index: u16,
        company_id: u16,
    ) -> Result<Arc<RegisteredFaults>, CoreError> {
        let operation = Operation::HealthFaultGet {
            address,
            app_index,
            company_id,
        };
        self.fetch(vec![operation], |s| &s.health.registered_faults)
            .await
    }

    pub async fn clear_faults(
        &self,
        address: u16,
        app_index: u16,
        company_id: u16,
    ) -> Result<Arc<RegisteredFaults>, CoreError> {
        let operation = Operation::HealthFaultClear {
            address,
            app_index,
            company_id,
        };
        self.fetch(vec![operation], |s| &s.health.registered_faults)
            .await
    }

    pub async fn test_faults(
        &self,
        address: u16,
        app_index: u16,
        company_id: u16,
        test_id: u8,
    ) -> Result<Arc<RegisteredFaults>, CoreError> {
        let operation = Operation::HealthFaultTest {
            address,
            app_index,
            company_id,
            test_id,
        };
        self.fetch(vec![operation], |s| &s.health.registered_faults)
            .await
    }

    pub async fn period_divisor(&self, address: u16, app_index: u16) -> Result<u8, CoreError> {
        let operation = Operation::HealthPeriodGet { address, app_index };
        let divisor = self
            .fetch(vec![operation], |s| &s.health.period_divisor)
            .await?;
        Ok(*divisor)
    }

    pub async fn set_period_divisor(
        &self,
        address: u16,
        app_index: u16,
        divisor: u8,
    ) -> Result<u8, CoreError> {
        let operation = Operation::HealthPeriodSet {
            address,
            app_index,
            divisor,
        };
        let divisor = self
            .fetch(vec![operation], |s| &s.health.period_divisor)
            .await?;
        Ok(*divisor)
    }

    pub async fn attention(&self, address: u16, app_index: u16) -> Result<u8, CoreError> {
        let operation = Operation::HealthAttentionGet { address, app_index };
        let attention = self
            .fetch(vec![operation], |s| &s.health.attention)
            .await?;
        Ok(*attention)
    }

    /// Start a node's attention timer. The gateway sends no answer.
    pub async fn set_attention(
        &self,
        address: u16,
        app_index: u16,
        attention: u8,
    ) -> Result<(), CoreError> {
        self.post(Operation::HealthAttentionSet {
            address,
            app_index,
            attention,
        })
        .await
    }

    pub async fn health_client_timeout(&self) -> Result<u32, CoreError> {
        let timeout = self
            .fetch(vec![Operation::HealthClientTimeoutGet], |s| {
                &s.health.client_timeout
            })
            .await?;
        Ok(*timeout)
    }

    /// The set has no answer of its own, so a get rides in the same turn.
    pub async fn set_health_client_timeout(&self, timeout: u32) -> Result<u32, CoreError> {
        let operations = vec![
            Operation::HealthClientTimeoutSet { timeout },
            Operation::HealthClientTimeoutGet,
        ];
        let timeout = self
            .fetch(operations, |s| &s.health.client_timeout)
            .await?;
        Ok(*timeout)
    }

    // ── Access layer ─────────────────────────────────────────────────

    /// Send an opaque model message. Answers, if any, arrive as
    /// [`Notification::ModelMessage`].
    pub async fn send_model_message(
        &self,
        net_index: u16,
        app_index: u16,
        address: u16,
        opcode: u32,
        payload: &[u8],
    ) -> Result<(), CoreError> {
        self.post(Operation::SendModelMessage {
            net_index,
            app_index,
            address,
            opcode,
            payload: payload.iter().copied().map(PayloadByte::from).collect(),
        })
        .await
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Refresh subnets, app keys and nodes, then discover every node
    /// whose configuration is not cached yet.
    ///
    /// Holds the gate for the whole chain; each step is bounded by the
    /// session timeout.
    pub async fn refresh_network(&self) -> Result<DiscoveryReport, CoreError> {
        let inner = &self.inner;
        let timeout = inner.config.timeout;
        let request_id = Uuid::new_v4().to_string();
        let held = inner
            .gate
            .enter(request_id.clone())
            .await
            .ok_or(CoreError::Cancelled)?;

        let first = self.discovery().start();
        if let Err(e) = inner
            .publisher
            .publish(&OperationEnvelope::with_id(request_id, first))
        {
            self.discovery().abort();
            return Err(e.into());
        }

        let wake = held.wait(timeout).await;

        let mut discovery = self.discovery();
        let phase = discovery.phase();
        match wake {
            Wake::Released if phase == DiscoveryPhase::Done => Ok(discovery.take_report()),
            Wake::Released => {
                discovery.abort();
                Err(CoreError::DiscoveryAborted {
                    reason: "a discovery request could not be published".into(),
                })
            }
            Wake::TimedOut => {
                discovery.abort();
                Err(CoreError::timeout(awaited_opcode(phase), timeout))
            }
            Wake::Cancelled => {
                discovery.abort();
                Err(CoreError::Cancelled)
            }
        }
    }

    // ── Selection ────────────────────────────────────────────────────

    pub async fn select_beacon(&self, chooser: &dyn Chooser) -> Result<Option<Beacon>, CoreError> {
        let beacons = self.beacons().await?;
        self.choose(chooser, "beacon", "Select a device to provision", beacons.to_vec())
    }

    pub async fn select_subnet(&self, chooser: &dyn Chooser) -> Result<Option<Subnet>, CoreError> {
        let subnets = self.subnets().await?;
        self.choose(chooser, "subnet", "Select a subnet", subnets.to_vec())
    }

    pub async fn select_app_key(&self, chooser: &dyn Chooser) -> Result<Option<AppKey>, CoreError> {
        let keys = self.app_keys().await?;
        self.choose(chooser, "application key", "Select an application key", keys.to_vec())
    }

    /// Nodes other than the gateway itself.
    pub async fn select_node(
        &self,
        chooser: &dyn Chooser,
    ) -> Result<Option<NodeSummary>, CoreError> {
        let nodes = self.nodes().await?;
        let nodes: Vec<NodeSummary> = nodes.iter().filter(|n| !n.is_gateway()).cloned().collect();
        self.choose(chooser, "node", "Select a node", nodes)
    }

    pub async fn select_subscription(
        &self,
        chooser: &dyn Chooser,
    ) -> Result<Option<Subscription>, CoreError> {
        let subscriptions = self.subscriptions().await?;
        self.choose(chooser, "subscription", "Select a subscribed address", subscriptions.to_vec())
    }

    fn choose<T: Labelled>(
        &self,
        chooser: &dyn Chooser,
        entity: &'static str,
        prompt: &str,
        items: Vec<T>,
    ) -> Result<Option<T>, CoreError> {
        if items.is_empty() {
            return Err(CoreError::NotFound {
                entity,
                identifier: "none available".into(),
            });
        }

        let labels: Vec<String> = items.iter().map(Labelled::label).collect();
        match chooser.choose(prompt, &labels) {
            Choice::Selected(index) => {
                let count = items.len();
                items
                    .into_iter()
                    .nth(index)
                    .map(Some)
                    .ok_or_else(|| CoreError::ValidationFailed {
                        message: format!("choice {index} out of range (0..{count})"),
                    })
            }
            Choice::Back => Ok(None),
            Choice::Exit => {
                tracing::debug!("exit chosen, cancelling session");
                self.inner.cancel.cancel();
                Err(CoreError::Cancelled)
            }
        }
    }

    fn discovery(&self) -> MutexGuard<'_, DiscoveryOrchestrator> {
        self.inner
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The request a discovery run in `phase` is waiting on.
fn awaited_opcode(phase: DiscoveryPhase) -> &'static str {
    match phase {
        DiscoveryPhase::Subnets => "subnet_request",
        DiscoveryPhase::AppKeys => "app_key_request",
        DiscoveryPhase::Nodes => "node_request",
        DiscoveryPhase::NodeDetail { .. } => "node_discover",
        DiscoveryPhase::Idle | DiscoveryPhase::Done => "network refresh",
    }
}

// ── Endpoint resolution ──────────────────────────────────────────────

async fn resolve_mqtt_config(config: &SessionConfig) -> Result<MqttConfig, CoreError> {
    let (host, topic_prefix, client_id) = match &config.endpoint {
        Endpoint::Account { api_url, api_key } => {
            let client = AccountClient::new(api_url.as_str(), api_key, config.timeout)?;
            let account = client.account().await?;
            let client_id = account.client_id().ok_or_else(|| CoreError::Config {
                message: format!(
                    "cannot derive an MQTT client id from topic prefix '{}'",
                    account.mqtt_topic_prefix
                ),
            })?;
            tracing::debug!(
                host = %account.mqtt_endpoint,
                prefix = %account.mqtt_topic_prefix,
                "resolved broker from account"
            );
            (account.mqtt_endpoint, account.mqtt_topic_prefix, client_id)
        }
        Endpoint::Broker {
            host,
            topic_prefix,
            client_id,
        } => (host.clone(), topic_prefix.clone(), client_id.clone()),
    };

    let topics = GatewayTopics::for_gateway(&topic_prefix, &config.gateway_id);
    let mut mqtt = MqttConfig::new(host, client_id, topics);
    mqtt.port = config.port;
    mqtt.keep_alive = config.keep_alive;
    mqtt.tls.clone_from(&config.tls);
    mqtt.reconnect = config.reconnect.clone();
    Ok(mqtt)
}
