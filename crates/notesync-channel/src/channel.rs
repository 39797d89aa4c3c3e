//! Save/push channel over MQTT.
//!
//! The channel carries two flows for each subscribed document:
//!
//! - **Save RPC**: a save request is published on the document's `save`
//!   topic and its reply arrives on a one-shot `save-reply/{attempt_id}`
//!   topic, correlated through a pending map and bounded by a hard
//!   timeout. A reply that arrives after the timeout finds its one-shot
//!   slot already consumed and is dropped.
//! - **Push notifications**: unsolicited `update` messages (another party
//!   saved) are forwarded to the session over an mpsc channel.

use notesync_proto::{doc_key, ChannelEvent, PushUpdate, SaveRequest, SaveResponse, TopicScheme};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use url::Url;
use uuid::Uuid;

/// Configuration for the sync channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// MQTT broker URL (e.g., <tcp://localhost:1883>)
    pub broker_url: String,
    /// Client ID for the MQTT connection
    pub client_id: String,
    /// Tenant identifier for topic isolation
    pub tenant: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Hard upper bound on a save attempt
    pub save_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "notesync".to_string(),
            tenant: "default".to_string(),
            keep_alive: Duration::from_secs(30),
            save_timeout: Duration::from_secs(10),
        }
    }
}

/// An unsolicited update received for a document.
#[derive(Debug, Clone)]
pub struct DocUpdate {
    /// Sharding key of the document the update belongs to
    pub doc_key: String,
    /// The pushed value and hash
    pub update: PushUpdate,
}

type PendingReplies = Arc<Mutex<HashMap<Uuid, oneshot::Sender<SaveResponse>>>>;

/// Bidirectional channel to the backend.
///
/// Cheap to clone; clones share the underlying connection and pending
/// reply map.
#[derive(Clone)]
pub struct SyncChannel {
    client: AsyncClient,
    topic_scheme: TopicScheme,
    pending: PendingReplies,
    save_timeout: Duration,
}

impl SyncChannel {
    /// Connect to the broker and spawn the event pump.
    ///
    /// Returns the channel and the receiver for push notifications.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn connect(
        config: &ChannelConfig,
    ) -> Result<(Self, mpsc::Receiver<DocUpdate>), ChannelError> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        let topic_scheme = TopicScheme::new(&config.tenant);
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (update_tx, update_rx) = mpsc::channel(100);

        tokio::spawn(run_event_pump(
            eventloop,
            topic_scheme.clone(),
            Arc::clone(&pending),
            update_tx,
        ));

        Ok((
            Self {
                client,
                topic_scheme,
                pending,
                save_timeout: config.save_timeout,
            },
            update_rx,
        ))
    }

    /// Subscribe to all channel events for a document.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription fails.
    pub async fn subscribe(&self, doc_id: &str) -> Result<(), ChannelError> {
        let topic = self.topic_scheme.doc_wildcard(&doc_key(doc_id));

        tracing::info!(doc_id, topic, "Subscribing to document events");

        self.client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| ChannelError::Subscribe(e.to_string()))?;

        Ok(())
    }

    /// Publish a save request and await its reply.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be serialized or published, if
    /// the reply does not arrive within the configured timeout, or if the
    /// channel shuts down while waiting.
    pub async fn save(&self, request: &SaveRequest) -> Result<SaveResponse, ChannelError> {
        let key = doc_key(&request.id);
        let topic = self.topic_scheme.save(&key);
        let payload = request
            .to_json()
            .map_err(|e| ChannelError::Serialize(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request.attempt_id, reply_tx);

        tracing::debug!(
            doc_id = %request.id,
            attempt_id = %request.attempt_id,
            payload_len = payload.len(),
            "Publishing save request"
        );

        if let Err(e) = self
            .client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            self.pending.lock().await.remove(&request.attempt_id);
            return Err(ChannelError::Publish(e.to_string()));
        }

        match tokio::time::timeout(self.save_timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::ChannelClosed),
            Err(_) => {
                // Consume the one-shot slot so a late reply is dropped.
                self.pending.lock().await.remove(&request.attempt_id);
                Err(ChannelError::Timeout(self.save_timeout))
            }
        }
    }
}

/// Poll the MQTT event loop and route incoming messages.
async fn run_event_pump(
    mut eventloop: EventLoop,
    topic_scheme: TopicScheme,
    pending: PendingReplies,
    update_tx: mpsc::Sender<DocUpdate>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some((doc_key, event)) = topic_scheme.parse(&publish.topic) else {
                    continue;
                };

                match event {
                    ChannelEvent::SaveReply(attempt_id) => {
                        match SaveResponse::from_json(&publish.payload) {
                            Ok(response) => {
                                if let Some(reply_tx) = pending.lock().await.remove(&attempt_id) {
                                    // The waiter may have timed out already.
                                    let _ = reply_tx.send(response);
                                } else {
                                    tracing::debug!(
                                        %attempt_id,
                                        "Dropping reply for expired save attempt"
                                    );
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    error = %err,
                                    %attempt_id,
                                    "Failed to decode save reply"
                                );
                            }
                        }
                    }
                    ChannelEvent::Update => match PushUpdate::from_json(&publish.payload) {
                        Ok(update) => {
                            if update_tx.send(DocUpdate { doc_key, update }).await.is_err() {
                                tracing::warn!("Update receiver dropped, stopping event pump");
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Failed to decode push update");
                        }
                    },
                    // Our own outgoing requests echo back through the
                    // document wildcard.
                    ChannelEvent::Save => {}
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::info!("Subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT error");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Parse a broker URL into host and port.
fn parse_broker_url(input: &str) -> Result<(String, u16), ChannelError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| ChannelError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(ChannelError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| ChannelError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ChannelError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            ChannelError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(ChannelError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for channel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
    /// No reply within the configured timeout
    #[error("save timed out after {0:?}")]
    Timeout(Duration),
    /// The event pump shut down while a reply was pending
    #[error("channel closed while awaiting reply")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::NotebookState;

    #[test]
    fn parse_broker_url_tcp() {
        let (host, port) = parse_broker_url("tcp://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("tcp://broker.example.com").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_no_scheme() {
        let (host, port) = parse_broker_url("localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_rejects_bad_input() {
        assert!(parse_broker_url("ws://localhost:1883").is_err());
        assert!(parse_broker_url(":1883").is_err());
        assert!(parse_broker_url("host:not-a-port").is_err());
        assert!(parse_broker_url("a:1:2").is_err());
    }

    fn offline_channel(save_timeout: Duration) -> (SyncChannel, EventLoop) {
        // An AsyncClient queues publishes locally until its event loop is
        // polled, so a channel whose event loop is held but never polled
        // exercises the timeout path without a broker.
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, eventloop) = AsyncClient::new(options, 10);
        (
            SyncChannel {
                client,
                topic_scheme: TopicScheme::new("test"),
                pending: Arc::new(Mutex::new(HashMap::new())),
                save_timeout,
            },
            eventloop,
        )
    }

    #[tokio::test]
    async fn save_times_out_and_clears_pending_slot() {
        let (channel, _eventloop) = offline_channel(Duration::from_millis(50));
        let request = SaveRequest::new("doc-1", NotebookState::new(), None);

        let result = channel.save(&request).await;
        assert!(matches!(result, Err(ChannelError::Timeout(_))));
        assert!(channel.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn save_resolves_when_reply_is_routed() {
        let (channel, _eventloop) = offline_channel(Duration::from_secs(5));
        let request = SaveRequest::new("doc-1", NotebookState::new(), None);
        let attempt_id = request.attempt_id;

        let pending = Arc::clone(&channel.pending);
        let replier = tokio::spawn(async move {
            // Wait for save() to register its one-shot slot, then answer
            // the way the event pump would.
            loop {
                if let Some(reply_tx) = pending.lock().await.remove(&attempt_id) {
                    reply_tx.send(SaveResponse::ack("h1")).ok();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let response = channel.save(&request).await.unwrap();
        assert!(matches!(response, SaveResponse::Ack { hash, .. } if hash == "h1"));
        replier.await.unwrap();
    }
}
