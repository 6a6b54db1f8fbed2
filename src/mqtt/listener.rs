//! Broker connection and message intake.
//!
//! The listener drives the `rumqttc` event loop on a background tokio task,
//! structured as a statum typestate machine:
//!
//! ```text
//! RainListener<Connecting> --establish()--> RainListener<Listening> --run()
//! ```
//!
//! `Connecting` polls until the broker acknowledges the session and issues
//! every subscription; the first error in this phase is fatal and aborts
//! startup. `Listening` turns each inbound publish into a [`SpawnRequest`]
//! for the render loop. Errors in this phase are logged and polling
//! continues (the transport reconnects on its own); nothing that happens to
//! a single message may take the listener down.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::payload::{process_payload, sanitize_text};
use crate::config::MqttSection;
use crate::rain::{RainStyle, SpawnRequest};

/// Client identifier presented to the broker.
const CLIENT_ID: &str = "mqtt-rain";

/// Keep-alive interval for the broker session.
const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Capacity of the client's outgoing request queue.
const REQUEST_QUEUE_CAPACITY: usize = 100;

/// Pause before polling again after a post-startup connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The broker could not be reached during startup.
    #[error("Failed to connect to broker: {0}")]
    Connect(#[from] rumqttc::ConnectionError),

    /// A subscription was rejected or could not be queued.
    #[error("Failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
}

/// Translates a configured topic filter to the broker's syntax, mapping the
/// `*` multi-level wildcard marker to `#`.
fn to_broker_filter(topic: &str) -> String {
    topic.replace('*', "#")
}

#[state]
#[derive(Debug, Clone)]
pub enum ListenerState {
    Connecting,
    Listening,
}

#[machine]
pub struct RainListener<S: ListenerState> {
    client: AsyncClient,
    events: EventLoop,
    topics: Vec<String>,
    json_fields: std::collections::HashMap<String, String>,
    style: RainStyle,
    spawn_tx: mpsc::Sender<SpawnRequest>,
    shutdown: CancellationToken,
    received: usize,
}

impl RainListener<Connecting> {
    pub fn create(
        config: &MqttSection,
        style: RainStyle,
        spawn_tx: mpsc::Sender<SpawnRequest>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut options = MqttOptions::new(CLIENT_ID, &config.broker, config.port);
        options.set_keep_alive(KEEP_ALIVE);

        // An empty username means no credentials, same as an absent one.
        if let Some(user) = config.username.as_deref().filter(|u| !u.is_empty()) {
            debug!("Using credentials for user {}", user);
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }

        let (client, events) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        Self::new(
            client,
            events,
            config.topics.clone(),
            config.json_fields.clone(),
            style,
            spawn_tx,
            shutdown,
            0,
        )
    }

    /// Polls until the broker acknowledges the connection, then issues every
    /// subscription. Any error here is a startup failure.
    pub async fn establish(mut self) -> Result<RainListener<Listening>, ListenerError> {
        loop {
            match self.events.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    info!(
                        "Connected to broker (code {:?}, session_present {})",
                        ack.code, ack.session_present
                    );
                    break;
                }
                other => debug!("Event before ConnAck: {:?}", other),
            }
        }

        for topic in &self.topics {
            let filter = to_broker_filter(topic);
            self.client
                .subscribe(&filter, QoS::AtMostOnce)
                .await
                .map_err(|source| ListenerError::Subscribe {
                    topic: filter.clone(),
                    source,
                })?;
            info!("Subscribed to {}", filter);
        }

        Ok(self.transition())
    }
}

impl RainListener<Listening> {
    /// Receive loop. Runs until the shutdown token fires, then disconnects
    /// best-effort and returns.
    pub async fn run(mut self) {
        info!("MQTT listener entering receive loop");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, disconnecting from broker");
                    if let Err(e) = self.client.disconnect().await {
                        warn!("Error disconnecting from broker: {}", e);
                    }
                    break;
                }
                event = self.events.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.handle_publish(publish);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Connection error in receive loop: {}", e);
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        }
        info!(
            "MQTT listener stopped after {} message(s)",
            self.received
        );
    }

    /// Turns one publish into a spawn request. Nothing here escalates: a
    /// message that cannot be processed or queued is logged and dropped.
    fn handle_publish(&mut self, publish: Publish) {
        self.received += 1;

        let raw_payload = String::from_utf8_lossy(&publish.payload);
        let processed = process_payload(&self.json_fields, &publish.topic, &raw_payload);
        let topic = sanitize_text(&publish.topic);
        let line = self.style.colorize(&topic, &processed);

        let request = SpawnRequest {
            topic,
            received_at: chrono::Local::now(),
            line,
        };
        debug!("Message #{}: {}", self.received, request);

        match self.spawn_tx.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Spawn queue full, dropping message on {}", dropped.topic);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Render loop gone, message discarded");
            }
        }
    }
}

/// Handle for the background listener task.
///
/// [`ListenerHandle::spawn`] performs the whole startup sequence before the
/// task is detached, so connection and subscription failures surface as a
/// `Result` to the caller instead of dying silently in the background.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub async fn spawn(
        config: &MqttSection,
        style: RainStyle,
        spawn_tx: mpsc::Sender<SpawnRequest>,
        shutdown: CancellationToken,
    ) -> Result<Self, ListenerError> {
        info!(
            "Connecting to MQTT broker {}:{}",
            config.broker, config.port
        );
        let connecting = RainListener::create(config, style, spawn_tx, shutdown);
        let listening = connecting.establish().await?;

        let task = tokio::spawn(async move {
            listening.run().await;
        });

        Ok(Self { task })
    }

    /// Waits for the listener task to finish, bounded so shutdown can never
    /// hang. Failures are logged and swallowed.
    pub async fn join(self) {
        match tokio::time::timeout(Duration::from_secs(2), self.task).await {
            Ok(Ok(())) => debug!("Listener task joined"),
            Ok(Err(e)) => error!("Listener task failed: {}", e),
            Err(_) => warn!("Timed out waiting for listener shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_becomes_multi_level_wildcard() {
        assert_eq!(to_broker_filter("home/*"), "home/#");
        assert_eq!(to_broker_filter("*"), "#");
    }

    #[test]
    fn plain_filters_are_untouched() {
        assert_eq!(to_broker_filter("sensors/temperature"), "sensors/temperature");
        assert_eq!(to_broker_filter("a/+/b"), "a/+/b");
    }
}
