//! MQTT transport for nRF Cloud gateways.
//!
//! [`MqttTransport`] is the send half and implements [`Publish`];
//! [`ReceiveLoop`] owns the rumqttc event loop and feeds every inbound
//! message to a callback. Reconnection is handled by re-polling the event
//! loop after an exponential backoff; each `ConnAck` triggers a fresh
//! subscription to the events topic.

use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::{Inbound, Publish, ReconnectConfig, TlsFiles, calculate_backoff};
use crate::wire::OperationEnvelope;

const DEFAULT_PORT: u16 = 8883;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 64;

// Duplicate delivery would release the gate twice; at-most-once avoids it.
const QOS: QoS = QoS::AtMostOnce;

// ── Topics ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTopics {
    /// Cloud to gateway (we publish here).
    pub command: String,
    /// Gateway to cloud (we subscribe here).
    pub events: String,
}

impl GatewayTopics {
    pub fn for_gateway(topic_prefix: &str, gateway_id: &str) -> Self {
        Self {
            command: format!("{topic_prefix}m/d/{gateway_id}/c2d"),
            events: format!("{topic_prefix}m/d/{gateway_id}/d2c"),
        }
    }
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub topics: GatewayTopics,
    /// `None` connects over plain TCP (local brokers only).
    pub tls: Option<TlsFiles>,
    pub reconnect: ReconnectConfig,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, client_id: impl Into<String>, topics: GatewayTopics) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            topics,
            tls: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── Send half ────────────────────────────────────────────────────────

/// Publishing handle. Cheap to clone.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    topics: GatewayTopics,
}

impl MqttTransport {
    /// Build the client and its event loop. Nothing touches the network
    /// until [`ReceiveLoop::run`] starts polling.
    pub async fn connect(config: MqttConfig) -> Result<(Self, ReceiveLoop), Error> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        if let Some(files) = &config.tls {
            let material = files.load().await?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca: material.ca_cert,
                alpn: None,
                client_auth: Some((material.client_cert, material.private_key)),
            }));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            tls = config.tls.is_some(),
            "MQTT transport configured"
        );

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let transport = Self {
            client: client.clone(),
            topics: config.topics.clone(),
        };
        let receive = ReceiveLoop {
            eventloop,
            client,
            topics: config.topics,
            reconnect: config.reconnect,
        };
        Ok((transport, receive))
    }

    pub fn topics(&self) -> &GatewayTopics {
        &self.topics
    }
}

impl Publish for MqttTransport {
    fn publish(&self, envelope: &OperationEnvelope) -> Result<(), Error> {
        let payload = envelope.to_json()?;
        tracing::debug!(
            request_id = %envelope.id,
            opcode = envelope.operation.opcode(),
            topic = %self.topics.command,
            "publishing operation"
        );
        self.client
            .try_publish(&self.topics.command, QOS, false, payload)
            .map_err(|e| Error::Mqtt(e.to_string()))
    }
}

// ── Receive half ─────────────────────────────────────────────────────

pub struct ReceiveLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    topics: GatewayTopics,
    reconnect: ReconnectConfig,
}

impl ReceiveLoop {
    /// Poll until cancelled or the retry budget is spent.
    ///
    /// `on_inbound` runs on this task; it must not wait on the gate.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut on_inbound: F) -> Result<(), Error>
    where
        F: FnMut(Inbound) + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!(code = ?ack.code, "connected to MQTT broker");
                    attempt = 0;
                    self.client
                        .try_subscribe(&self.topics.events, QOS)
                        .map_err(|e| Error::Mqtt(e.to_string()))?;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    tracing::debug!(topic = %self.topics.events, "subscription acknowledged");
                    on_inbound(Inbound::Subscribed);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.topics.events {
                        on_inbound(Inbound::from_payload(&publish.payload));
                    } else {
                        tracing::debug!(topic = %publish.topic, "ignoring message on foreign topic");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::info!("broker sent disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "MQTT connection error");

                    if let Some(max) = self.reconnect.max_retries {
                        if attempt >= max {
                            tracing::error!(max_retries = max, "MQTT reconnection limit reached, giving up");
                            return Err(Error::MqttConnection(e.to_string()));
                        }
                    }

                    let delay = calculate_backoff(attempt, &self.reconnect);
                    tracing::info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "waiting before reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }

        tracing::debug!("MQTT receive loop exiting");
        // Best effort; the broker drops us on keep-alive expiry anyway.
        let _ = self.client.try_disconnect();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::wire::Operation;

    #[test]
    fn topics_follow_gateway_layout() {
        let topics = GatewayTopics::for_gateway("prod/abc-123/", "nrf-352656100000000");
        assert_eq!(topics.command, "prod/abc-123/m/d/nrf-352656100000000/c2d");
        assert_eq!(topics.events, "prod/abc-123/m/d/nrf-352656100000000/d2c");
    }

    #[test]
    fn config_defaults() {
        let config = MqttConfig::new("mqtt.example.com", "account-abc", GatewayTopics::for_gateway("p/", "gw"));
        assert_eq!(config.port, 8883);
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        assert!(config.tls.is_none());
    }

    #[tokio::test]
    async fn publish_queues_without_network() {
        let config = MqttConfig::new("127.0.0.1", "test", GatewayTopics::for_gateway("p/", "gw"));
        let (transport, _receive) = MqttTransport::connect(config).await.unwrap();
        let envelope = OperationEnvelope::with_id("1", Operation::NodeRequest);
        transport.publish(&envelope).unwrap();
    }

    #[tokio::test]
    async fn cancelled_loop_exits_cleanly() {
        let config = MqttConfig::new("127.0.0.1", "test", GatewayTopics::for_gateway("p/", "gw"));
        let (_transport, receive) = MqttTransport::connect(config).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut seen = Vec::new();
        receive.run(cancel, |inbound| seen.push(inbound)).await.unwrap();
        assert!(seen.is_empty());
    }
}
