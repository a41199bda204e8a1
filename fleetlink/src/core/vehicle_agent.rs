/*!
Vehicle-side agent: publishes state at a fixed rate, raises teleoperation
alerts and listens for control commands
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use fleetlink_protocol::{Alert, ControlCommand, TopicScheme, VehicleState, decode, encode, now_millis};

use crate::core::{
    config::VehicleConfig,
    error::BridgeError,
    transport::{Message, Transport},
};

const FALLBACK_PUBLISH_HZ: f64 = 10.0;
const MIN_PUBLISH_INTERVAL: Duration = Duration::from_millis(1);
const MAX_PUBLISH_INTERVAL: Duration = Duration::from_secs(60);

/// Source of the vehicle's current state, called once per publish tick
pub trait StateProvider: Send + Sync {
    fn snapshot(&self) -> VehicleState;
}

impl<F> StateProvider for F
where
    F: Fn() -> VehicleState + Send + Sync,
{
    fn snapshot(&self) -> VehicleState {
        self()
    }
}

pub struct VehicleAgent {
    config: VehicleConfig,
    topics: TopicScheme,
    transport: Arc<dyn Transport>,
    provider: Box<dyn StateProvider>,
}

impl VehicleAgent {
    pub fn new<P>(
        config: VehicleConfig,
        topics: TopicScheme,
        transport: Arc<dyn Transport>,
        provider: P,
    ) -> Self
    where
        P: StateProvider + 'static,
    {
        Self {
            config,
            topics,
            transport,
            provider: Box::new(provider),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.config.vehicle_id
    }

    /// Time between state publications, kept within 1 ms..=60 s
    pub fn publish_interval(&self) -> Duration {
        let hz = self.config.publish_hz;
        let hz = if hz.is_finite() && hz > 0.0 { hz } else { FALLBACK_PUBLISH_HZ };
        Duration::try_from_secs_f64(1.0 / hz)
            .unwrap_or(MAX_PUBLISH_INTERVAL)
            .clamp(MIN_PUBLISH_INTERVAL, MAX_PUBLISH_INTERVAL)
    }

    /// Publish one state snapshot stamped with the current time
    pub async fn publish_state(&self) -> Result<(), BridgeError> {
        let mut state = self.provider.snapshot();
        if state.vehicle_id.is_empty() {
            state.vehicle_id = self.config.vehicle_id.clone();
        }
        state.timestamp = now_millis();

        let payload = encode(&state)?;
        self.transport
            .publish(&self.topics.state_topic(&state.vehicle_id), payload)
            .await?;
        Ok(())
    }

    /// Ask the control center for a human to take over
    pub async fn raise_alert(
        &self,
        reason: &str,
        latitude: f64,
        longitude: f64,
        severity: i32,
    ) -> Result<(), BridgeError> {
        let mut alert = Alert::new(
            self.config.vehicle_id.as_str(),
            reason,
            latitude,
            longitude,
            severity,
        );
        alert.timestamp = now_millis();

        let payload = encode(&alert)?;
        self.transport
            .publish(&self.topics.alert_topic(&self.config.vehicle_id), payload)
            .await?;
        info!(vehicle_id = %self.config.vehicle_id, reason, severity, "teleoperation alert raised");
        Ok(())
    }

    /// Decode and log a control command addressed to this vehicle
    pub fn handle_control(&self, message: &Message) -> Option<ControlCommand> {
        match decode::<ControlCommand>(&message.payload) {
            Ok(command) => {
                info!(
                    vehicle_id = %self.config.vehicle_id,
                    action = ?command.action,
                    speed = command.target_speed,
                    heading = command.target_heading,
                    "received command"
                );
                Some(command)
            }
            Err(e) => {
                warn!(vehicle_id = %self.config.vehicle_id, error = %e, "bad control message");
                None
            }
        }
    }

    /// Publish state every tick and handle control commands until `shutdown`
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        let mut controls = self
            .transport
            .subscribe(&self.topics.control_topic(&self.config.vehicle_id))
            .await?;
        let interval = self.publish_interval();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            vehicle_id = %self.config.vehicle_id,
            hz = 1.0 / interval.as_secs_f64(),
            "🚀 vehicle agent started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_state().await {
                        error!(vehicle_id = %self.config.vehicle_id, error = %e, "publish error");
                    }
                }
                Some(message) = controls.next() => {
                    self.handle_control(&message);
                }
            }
        }
        info!(vehicle_id = %self.config.vehicle_id, "🛑 vehicle agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fleetlink_protocol::ControlAction;

    use super::*;
    use crate::core::transport::LocalBroker;

    fn agent(broker: &LocalBroker, hz: f64) -> VehicleAgent {
        VehicleAgent::new(
            VehicleConfig {
                vehicle_id: "car-001".into(),
                publish_hz: hz,
            },
            TopicScheme::default(),
            Arc::new(broker.clone()),
            VehicleState::default,
        )
    }

    #[test]
    fn publish_interval_falls_back_to_ten_hz() {
        let broker = LocalBroker::default();
        assert_eq!(agent(&broker, 20.0).publish_interval(), Duration::from_millis(50));
        assert_eq!(agent(&broker, 0.0).publish_interval(), Duration::from_millis(100));
        assert_eq!(agent(&broker, -3.0).publish_interval(), Duration::from_millis(100));
        assert_eq!(agent(&broker, f64::NAN).publish_interval(), Duration::from_millis(100));
    }

    #[test]
    fn publish_interval_is_clamped_at_both_extremes() {
        let broker = LocalBroker::default();
        assert_eq!(agent(&broker, 1e-300).publish_interval(), Duration::from_secs(60));
        assert_eq!(agent(&broker, 0.001).publish_interval(), Duration::from_secs(60));
        assert_eq!(agent(&broker, 1e10).publish_interval(), Duration::from_millis(1));
        assert_eq!(agent(&broker, f64::MAX).publish_interval(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_extreme_rate() {
        let broker = LocalBroker::default();
        agent(&broker, 1e10)
            .run(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_state_stamps_id_and_time() {
        let broker = LocalBroker::default();
        let mut states = broker.subscribe("v1/vehicle/+/state").await.unwrap();
        let before = now_millis();

        agent(&broker, 10.0).publish_state().await.unwrap();

        let message = states.next().await.unwrap();
        assert_eq!(message.topic, "v1/vehicle/car-001/state");
        let state: VehicleState = decode(&message.payload).unwrap();
        assert_eq!(state.vehicle_id, "car-001");
        assert!(state.timestamp >= before);
    }

    #[tokio::test]
    async fn raise_alert_publishes_on_alert_topic() {
        let broker = LocalBroker::default();
        let mut alerts = broker.subscribe("v1/vehicle/car-001/alert").await.unwrap();

        agent(&broker, 10.0)
            .raise_alert("extreme_weather", 39.9, 116.4, 2)
            .await
            .unwrap();

        let alert: Alert = decode(&alerts.next().await.unwrap().payload).unwrap();
        assert_eq!(alert.reason, "extreme_weather");
        assert_eq!(alert.severity, 2);
        assert!(alert.timestamp > 0);
    }

    #[test]
    fn handle_control_decodes_commands() {
        let broker = LocalBroker::default();
        let agent = agent(&broker, 10.0);
        let command = ControlCommand::new("cmd-9", "car-001", ControlAction::Resume);
        let message = Message {
            topic: "v1/vehicle/car-001/control".into(),
            payload: encode(&command).unwrap(),
        };

        assert_eq!(agent.handle_control(&message), Some(command));
        let garbage = Message {
            topic: "v1/vehicle/car-001/control".into(),
            payload: b"nope".to_vec(),
        };
        assert_eq!(agent.handle_control(&garbage), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_until_shutdown() {
        let broker = LocalBroker::default();
        let mut states = broker.subscribe("v1/vehicle/car-001/state").await.unwrap();
        let agent = agent(&broker, 10.0);

        agent
            .run(tokio::time::sleep(Duration::from_millis(350)))
            .await
            .unwrap();

        let mut published = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(1), states.next()).await
        {
            published += 1;
        }
        // Ticks at 0, 100, 200 and 300 ms.
        assert_eq!(published, 4);
    }
}
