//! MQTT subscription and message ingestion.
//!
//! This module owns the inbound side of the service: it connects to the
//! configured broker, subscribes to the full topic hierarchy under the
//! configured prefix, and appends every received message to the store.
//!
//! # Delivery semantics
//!
//! Messages arrive in transport order with the broker's at-least-once
//! guarantee (at QoS 1). Each message is appended synchronously; if the
//! append fails, the message is logged and dropped so the delivery loop never
//! stalls. No retry or deduplication is layered on top of the transport.
//!
//! # Reconnection
//!
//! Transient connection errors are logged and retried after a short pause.
//! The subscription is re-issued on every ConnAck, so it survives broker
//! restarts. A requested shutdown sends a clean disconnect instead.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// MQTT ingestion loop handle.
pub struct Ingestor {
    state: Arc<AppState>,
}

impl Ingestor {
    /// Create a new ingestor.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the ingestion loop.
    ///
    /// Returns the handle of the spawned task; the task runs until shutdown
    /// is signalled or the broker URL turns out to be unusable.
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_ingest(state).await;
        })
    }
}

/// Run the MQTT ingestion loop.
async fn run_ingest(state: Arc<AppState>) {
    let config = state.config.mqtt.clone();
    let mut stop_rx = state.shutdown.subscribe();

    // Parse broker URL
    let (host, port, use_tls) = match parse_broker_url(&config.broker) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Invalid MQTT broker URL: {}", e);
            return;
        }
    };

    // Configure MQTT client
    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive));

    // Set credentials if provided
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        mqtt_options.set_credentials(username, password);
    }

    // Enable TLS if using mqtts://
    if use_tls {
        mqtt_options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    let qos = match config.qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    };

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
    let filter = format!("{}/#", config.topic_prefix);

    info!("Connecting to MQTT broker {}", config.broker);

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker with result code {:?}", ack.code);
                    // Subscribe on every new session, not just the first
                    if let Err(e) = client.subscribe(&filter, qos).await {
                        error!("Failed to subscribe to {}: {}", filter, e);
                    } else {
                        info!("Subscribed to {}", filter);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    on_message(&state, &publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    if state.shutdown.is_triggered() {
                        break;
                    }
                    warn!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            },
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Ingestion received stop signal");
                    break;
                }
            }
        }
    }

    // Disconnect gracefully
    if let Err(e) = client.disconnect().await {
        debug!("Error disconnecting MQTT client: {}", e);
    }

    info!("Ingestion stopped");
}

/// Handle one inbound message: append it to the store.
///
/// Append failures are logged and the message is dropped. The transport's
/// delivery guarantee is the only retry layer; stalling here would stall the
/// whole subscription.
async fn on_message(state: &AppState, topic: &str, payload: &[u8]) {
    debug!("{} -> {} byte(s)", topic, payload.len());

    let store = state.store.lock().await;
    match store.as_ref() {
        Some(store) => {
            if let Err(e) = store.append(topic, payload) {
                error!("Failed to store message on {}: {}", topic, e);
            }
        }
        None => warn!("Store is closed, dropping message on {}", topic),
    }
}

/// Parse an MQTT broker URL into (host, port, use_tls).
fn parse_broker_url(url: &str) -> Result<(String, u16, bool), String> {
    let (scheme, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        ("mqtt", stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        ("mqtts", stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let use_tls = scheme == "mqtts";
    let default_port = if use_tls { 8883 } else { 1883 };

    // Parse host:port
    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}
