/*!
Control-center adapter: feeds inbound state and alert messages into the
shadow store and alert hub, and sends control commands back to vehicles
*/

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use fleetlink_protocol::{
    Alert, Channel, ControlCommand, TopicScheme, VehicleState, decode, encode, now_millis,
};

use crate::core::{
    alert_hub::{AlertHub, AlertTier},
    config::{BridgeConfig, ControlCenterConfig},
    error::BridgeError,
    shadow::{ShadowStore, UpdateOutcome},
    transport::{Message, Subscription, Transport},
};

/// Live subscriptions for every vehicle's state and alert channels
pub struct Inbox {
    states: Subscription,
    alerts: Subscription,
}

#[derive(Debug, Default)]
struct Counters {
    states_accepted: AtomicU64,
    states_stale: AtomicU64,
    messages_rejected: AtomicU64,
    alerts_dispatched: AtomicU64,
}

/// Statistics about the control center's operation
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStats {
    pub states_accepted: u64,
    pub states_stale: u64,
    pub messages_rejected: u64,
    pub alerts_dispatched: u64,
    pub vehicles_tracked: usize,
    pub uptime: Duration,
    pub last_event_time: Option<DateTime<Utc>>,
}

/// Owns the shadow store and alert hub for one monitoring center
pub struct ControlCenter {
    config: ControlCenterConfig,
    topics: TopicScheme,
    transport: Arc<dyn Transport>,
    shadows: Arc<ShadowStore>,
    alerts: Arc<AlertHub>,
    counters: Counters,
    started: Instant,
    last_event: Mutex<Option<DateTime<Utc>>>,
}

impl ControlCenter {
    pub fn new(config: &BridgeConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: config.control_center.clone(),
            topics: config.topic_scheme(),
            transport,
            shadows: Arc::new(ShadowStore::new()),
            alerts: Arc::new(AlertHub::new()),
            counters: Counters::default(),
            started: Instant::now(),
            last_event: Mutex::new(None),
        }
    }

    /// The digital-twin store
    pub fn shadows(&self) -> &Arc<ShadowStore> {
        &self.shadows
    }

    /// The alert hub, for registering operator listeners
    pub fn alerts(&self) -> &Arc<AlertHub> {
        &self.alerts
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    /// Subscribe to `{prefix}/+/state` and `{prefix}/+/alert`
    pub async fn subscribe(&self) -> Result<Inbox, BridgeError> {
        let states = self
            .transport
            .subscribe(&self.topics.wildcard(Channel::State))
            .await?;
        let alerts = self
            .transport
            .subscribe(&self.topics.wildcard(Channel::Alert))
            .await?;
        info!(
            client_id = %self.config.client_id,
            transport = self.transport.name(),
            prefix = self.topics.prefix(),
            "control center subscribed"
        );
        Ok(Inbox { states, alerts })
    }

    /// Subscribe and serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        let inbox = self.subscribe().await?;
        self.serve(inbox, shutdown).await;
        Ok(())
    }

    /// Process inbound messages and log a periodic shadow summary
    pub async fn serve<F>(&self, inbox: Inbox, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Inbox {
            mut states,
            mut alerts,
        } = inbox;
        let period = Duration::from_secs(self.config.summary_interval_secs.max(1));
        let mut summary = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(shutdown);

        info!("🚀 control center {} started", self.config.client_id);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(message) = states.next() => {
                    self.ingest_state(&message);
                }
                Some(message) = alerts.next() => {
                    self.ingest_alert(&message);
                }
                _ = summary.tick() => self.log_summary(),
            }
        }
        info!("🛑 control center {} stopped", self.config.client_id);
    }

    /// Decode a state message and apply it to the shadow store.
    /// Malformed messages and messages without a vehicle id are dropped.
    pub fn ingest_state(&self, message: &Message) -> Option<UpdateOutcome> {
        let state: VehicleState = match decode(&message.payload) {
            Ok(state) => state,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "bad state message");
                self.counters.messages_rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if state.vehicle_id.is_empty() {
            warn!(topic = %message.topic, "state message without vehicle_id");
            self.counters.messages_rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.touch();
        let outcome = self.shadows.update(state);
        match outcome {
            UpdateOutcome::Stale => {
                debug!(topic = %message.topic, "stale state report ignored");
                self.counters.states_stale.fetch_add(1, Ordering::Relaxed);
            }
            UpdateOutcome::Inserted => {
                info!(topic = %message.topic, "new vehicle tracked");
                self.counters.states_accepted.fetch_add(1, Ordering::Relaxed);
            }
            UpdateOutcome::Replaced => {
                self.counters.states_accepted.fetch_add(1, Ordering::Relaxed);
            }
        }
        Some(outcome)
    }

    /// Decode an alert message and fan it out through the alert hub
    pub fn ingest_alert(&self, message: &Message) -> Option<AlertTier> {
        let alert: Alert = match decode(&message.payload) {
            Ok(alert) => alert,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "bad alert message");
                self.counters.messages_rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if alert.vehicle_id.is_empty() {
            warn!(topic = %message.topic, "alert message without vehicle_id");
            self.counters.messages_rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.touch();
        let tier = self.alerts.dispatch(&alert);
        self.counters.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
        Some(tier)
    }

    /// Stamp `command` and publish it on the vehicle's control topic
    pub async fn send_control(&self, mut command: ControlCommand) -> Result<(), BridgeError> {
        command.timestamp = now_millis();
        let payload = encode(&command)?;
        let topic = self.topics.control_topic(&command.vehicle_id);
        self.transport.publish(&topic, payload).await?;
        info!(
            vehicle_id = %command.vehicle_id,
            command_id = %command.command_id,
            action = ?command.action,
            "control command sent"
        );
        Ok(())
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            states_accepted: self.counters.states_accepted.load(Ordering::Relaxed),
            states_stale: self.counters.states_stale.load(Ordering::Relaxed),
            messages_rejected: self.counters.messages_rejected.load(Ordering::Relaxed),
            alerts_dispatched: self.counters.alerts_dispatched.load(Ordering::Relaxed),
            vehicles_tracked: self.shadows.len(),
            uptime: self.started.elapsed(),
            last_event_time: *self.last_event.lock(),
        }
    }

    fn touch(&self) {
        *self.last_event.lock() = Some(Utc::now());
    }

    fn log_summary(&self) {
        let window = Duration::from_secs(self.config.active_window_secs);
        let active = self.shadows.active_vehicles(window);
        info!(
            tracked = self.shadows.len(),
            active = active.len(),
            window_secs = window.as_secs(),
            "📊 shadow summary"
        );
    }
}
