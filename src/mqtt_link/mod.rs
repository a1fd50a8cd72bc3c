//! MQTT link
//!
//! ## Responsibilities
//!
//! - Broker connection and credentials
//! - One publisher task owning the client; all outbound traffic flows
//!   through its command channel
//! - One receiver task polling the event loop, forwarding inbound
//!   publishes and resubscribing after reconnects
//!
//! The client is never shared directly. Tasks that need to emit hold a
//! cloned [`LinkHandle`], which is a thin wrapper around the command
//! channel sender. This makes the sharing contract explicit instead of
//! assuming the client itself is thread-safe.

mod topics;

pub use topics::TopicSet;

use crate::error::{Error, Result};
use crate::state::AgentConfig;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands accepted by the publisher task
#[derive(Debug)]
pub enum LinkCommand {
    Publish { topic: String, payload: Vec<u8> },
    Subscribe { topic: String },
    Resubscribe,
    Shutdown,
}

/// An inbound publish handed to the dispatcher
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Cloneable handle to the publisher task
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::UnboundedSender<LinkCommand>,
}

impl LinkHandle {
    /// Handle backed by a bare channel, with no broker behind it.
    /// Used by tests to capture outbound traffic.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<LinkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, topic: String, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send(LinkCommand::Publish { topic, payload })
            .map_err(|_| Error::Internal("publisher task gone".to_string()))
    }

    pub fn subscribe(&self, topic: String) -> Result<()> {
        self.tx
            .send(LinkCommand::Subscribe { topic })
            .map_err(|_| Error::Internal("publisher task gone".to_string()))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(LinkCommand::Shutdown);
    }
}

/// Broker connection. Owns nothing after `connect`; both halves run as
/// spawned tasks.
pub struct MqttLink;

impl MqttLink {
    /// Connect to the broker and spawn the publisher/receiver tasks.
    ///
    /// Waits for the initial CONNACK so a bad broker address or token
    /// fails startup instead of being retried silently.
    pub async fn connect(
        config: &AgentConfig,
    ) -> Result<(LinkHandle, mpsc::UnboundedReceiver<InboundMessage>)> {
        // Unique client id so a second instance never steals the session
        let client_id = format!(
            "{}-{}",
            config.application_name,
            Uuid::new_v4().simple()
        );
        let mut options = MqttOptions::new(client_id, config.mqtt_host.clone(), config.mqtt_port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(token) = &config.application_token {
            options.set_credentials("application", token.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);

        // Fail fast on the first connection attempt
        let connack = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(Error::Connection(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| Error::Connection("broker handshake timed out".to_string()))??;

        info!(
            host = %config.mqtt_host,
            port = config.mqtt_port,
            session_present = connack.session_present,
            "MQTT link established"
        );

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<LinkCommand>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();

        // Publisher task: sole owner of the client
        tokio::spawn(async move {
            let mut subscriptions: Vec<String> = Vec::new();
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    LinkCommand::Publish { topic, payload } => {
                        if let Err(e) = client
                            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
                            .await
                        {
                            warn!(topic = %topic, error = %e, "Publish failed");
                        }
                    }
                    LinkCommand::Subscribe { topic } => {
                        if !subscriptions.contains(&topic) {
                            subscriptions.push(topic.clone());
                        }
                        if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                            warn!(topic = %topic, error = %e, "Subscribe failed");
                        }
                    }
                    LinkCommand::Resubscribe => {
                        for topic in &subscriptions {
                            if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await
                            {
                                warn!(topic = %topic, error = %e, "Resubscribe failed");
                            }
                        }
                    }
                    LinkCommand::Shutdown => {
                        let _ = client.disconnect().await;
                        break;
                    }
                }
            }
            debug!("Publisher task stopped");
        });

        // Receiver task: polls the event loop until the connection is torn down
        let pump_tx = cmd_tx.clone();
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if inbound_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Reconnected to broker, restoring subscriptions");
                        if pump_tx.send(LinkCommand::Resubscribe).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        info!("Broker closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT event loop error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            debug!("Receiver task stopped");
        });

        Ok((LinkHandle { tx: cmd_tx }, inbound_rx))
    }
}
