//! Impure I/O operations for the MQTT client
//!
//! The client owns a rumqttc event loop driven by a supervisor task:
//! route incoming events, resubscribe on every ConnAck, and back off with a
//! fixed delay between reconnection attempts. Shutdown is coordinated over a
//! watch channel so the supervisor exits promptly.

use super::connection::{configure_mqtt_options, ConnectionState, ReconnectConfig};
use super::message_handler::{EventForwarder, EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::model::ids::DeviceId;
use crate::protocol::{CommandPayload, TopicGrammar};
use crate::transport::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);

/// MQTT transport client for device communication
pub struct MqttClient {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    config: MqttSection,
    grammar: TopicGrammar,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
    forwarder: Arc<Mutex<EventForwarder>>,
    reconnect_config: ReconnectConfig,
}

impl MqttClient {
    pub fn new(config: MqttSection) -> Result<Self, TransportError> {
        let mqtt_options = configure_mqtt_options(&config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let grammar = TopicGrammar::new(config.topic_prefix.clone());
        let reconnect_config = ReconnectConfig::from_section(&config);

        Ok(MqttClient {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            config,
            grammar,
            state_rx: None,
            shutdown_tx: None,
            supervisor_handle: Mutex::new(None),
            forwarder: Arc::new(Mutex::new(EventForwarder::new())),
            reconnect_config,
        })
    }

    /// Set the sender decoded device events are forwarded on
    pub async fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        let mut forwarder = self.forwarder.lock().await;
        forwarder.set_event_sender(sender);
    }

    /// Connect to the broker and start the supervisor task.
    ///
    /// Returns once the broker has acknowledged the connection; the
    /// supervisor keeps reconnecting with a fixed delay until `disconnect`.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("already connected".to_string()))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(Self::supervise(
            event_loop,
            self.client.clone(),
            self.grammar.clone(),
            self.forwarder.clone(),
            self.reconnect_config.clone(),
            state_tx,
            shutdown_rx,
        ));
        *self.supervisor_handle.lock().await = Some(handle);

        Self::wait_for_connection_confirmation(state_rx, CONNACK_TIMEOUT).await?;
        info!(broker = %self.config.broker_url, "MQTT transport connected");
        Ok(())
    }

    /// Signal shutdown and disconnect from the broker
    pub async fn disconnect(&self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        let _ = self.client.disconnect().await;
        if let Some(handle) = self.supervisor_handle.lock().await.take() {
            let _ = handle.await;
        }
        info!("MQTT transport disconnected");
    }

    async fn supervise(
        mut event_loop: EventLoop,
        client: AsyncClient,
        grammar: TopicGrammar,
        forwarder: Arc<Mutex<EventForwarder>>,
        reconnect_config: ReconnectConfig,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Starting MQTT event loop supervisor");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT supervisor");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            Self::handle_event_route(
                                MessageHandler::route_mqtt_event(&event),
                                &client,
                                &grammar,
                                &forwarder,
                                &state_tx,
                            )
                            .await;
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            warn!(error = %reason, "MQTT connection error, reconnecting");
                            let _ = state_tx.send(ConnectionState::Disconnected(reason));
                            // Shutdown-responsive backoff before the next
                            // poll retries the connection
                            tokio::select! {
                                _ = tokio::time::sleep(reconnect_config.delay) => {}
                                _ = shutdown_rx.changed() => {
                                    if *shutdown_rx.borrow() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        info!("MQTT event loop supervisor stopped");
    }

    async fn handle_event_route(
        route: EventRoute,
        client: &AsyncClient,
        grammar: &TopicGrammar,
        forwarder: &Arc<Mutex<EventForwarder>>,
        state_tx: &watch::Sender<ConnectionState>,
    ) {
        match route {
            EventRoute::ConnectionAcknowledged => {
                info!("Broker acknowledged connection, subscribing to device topics");
                let _ = state_tx.send(ConnectionState::Connected);
                for filter in grammar.subscription_filters() {
                    if let Err(e) = client.subscribe(filter.clone(), QoS::AtLeastOnce).await {
                        warn!(filter, error = %e, "Subscription failed");
                    }
                }
            }
            EventRoute::MessageReceived { topic, payload } => {
                if let Some(event) = MessageHandler::decode_message(
                    grammar,
                    &topic,
                    &payload,
                    chrono::Utc::now(),
                ) {
                    forwarder.lock().await.forward(event).await;
                }
            }
            EventRoute::Disconnected => {
                warn!("Broker initiated disconnect");
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "broker disconnect".to_string(),
                ));
            }
            EventRoute::InfrastructureEvent | EventRoute::OutgoingEvent => {
                debug!("Infrastructure MQTT event");
            }
        }
    }

    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(TransportError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::ConnectionFailed(
                "timed out waiting for broker acknowledgment".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    async fn publish_command(
        &self,
        device_id: &DeviceId,
        payload: &CommandPayload,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let topic = self.grammar.command_topic(device_id);
        let body = Bytes::from(serde_json::to_vec(payload).map_err(TransportError::Serialization)?);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, body)
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state_rx
            .as_ref()
            .map(|rx| *rx.borrow() == ConnectionState::Connected)
            .unwrap_or(false)
    }
}
