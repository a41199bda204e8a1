/*!
Local fleet simulation: a control center and a handful of simulated vehicles
sharing an in-process broker
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

use fleetlink_protocol::{Alert, ControlAction, ControlCommand, Gear, VehicleState};

use crate::core::{
    alert_hub::AlertTier,
    config::{BridgeConfig, SimulationConfig, VehicleConfig},
    control_center::{BridgeStats, ControlCenter},
    error::BridgeError,
    output_plugins::install_outputs,
    transport::{LocalBroker, Transport},
    vehicle_agent::VehicleAgent,
};

const ALERT_REASONS: &[&str] = &[
    "extreme_weather",
    "unmarked_construction",
    "sensor_failure",
    "blocked_lane",
];

/// Random-walk state source standing in for real sensors
pub struct SimulatedVehicle {
    state: Mutex<VehicleState>,
}

impl SimulatedVehicle {
    pub fn new(vehicle_id: &str, latitude: f64, longitude: f64) -> Self {
        let mut state = VehicleState::new(vehicle_id);
        state.latitude = latitude;
        state.longitude = longitude;
        state.gear = Gear::Drive;
        state.battery_pct = 80.0;
        Self {
            state: Mutex::new(state),
        }
    }

    /// Advance the walk one step and return the new state
    pub fn next_state(&self) -> VehicleState {
        let mut rng = rand::thread_rng();
        let mut state = self.state.lock();
        state.latitude += rng.gen_range(-0.5..0.5) * 0.0001;
        state.longitude += rng.gen_range(-0.5..0.5) * 0.0001;
        state.speed = 10.0 + rng.gen_range(0.0..5.0);
        state.heading = rng.gen_range(0.0..360.0);
        state.battery_pct = (state.battery_pct - 0.001).max(0.0);
        state.clone()
    }

    pub fn position(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.latitude, state.longitude)
    }
}

pub struct Simulation {
    config: BridgeConfig,
}

impl Simulation {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Run the fleet until `shutdown` resolves and return the control
    /// center's final statistics
    pub async fn run<F>(self, shutdown: F) -> Result<BridgeStats, BridgeError>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(LocalBroker::default());
        let control_center = Arc::new(ControlCenter::new(&self.config, Arc::clone(&transport)));
        install_outputs(control_center.alerts(), &self.config.alerts.outputs)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        // Operator desk: answer critical alerts with a takeover request.
        let (takeover_tx, takeover_rx) = mpsc::channel::<Alert>(32);
        control_center.alerts().register(move |alert: &Alert| {
            if AlertTier::classify(alert.severity) != AlertTier::Critical {
                return;
            }
            info!(
                vehicle_id = %alert.vehicle_id,
                reason = %alert.reason,
                "[OPERATOR] vehicle needs takeover"
            );
            if takeover_tx.try_send(alert.clone()).is_err() {
                warn!(vehicle_id = %alert.vehicle_id, "operator desk busy, takeover skipped");
            }
        });
        tasks.spawn(operator_desk(
            Arc::clone(&control_center),
            takeover_rx,
            stop_rx.clone(),
        ));

        let inbox = control_center.subscribe().await?;
        {
            let control_center = Arc::clone(&control_center);
            let stop = stop_rx.clone();
            tasks.spawn(async move {
                control_center.serve(inbox, stopped(stop)).await;
                Ok(())
            });
        }

        for index in 0..self.config.simulation.vehicles {
            let vehicle_id = format!("car-{:03}", index + 1);
            let vehicle = Arc::new(SimulatedVehicle::new(
                &vehicle_id,
                self.config.simulation.base_latitude,
                self.config.simulation.base_longitude,
            ));
            let agent = {
                let vehicle = Arc::clone(&vehicle);
                Arc::new(VehicleAgent::new(
                    VehicleConfig {
                        vehicle_id,
                        publish_hz: self.config.vehicle.publish_hz,
                    },
                    self.config.topic_scheme(),
                    Arc::clone(&transport),
                    move || vehicle.next_state(),
                ))
            };

            {
                let agent = Arc::clone(&agent);
                let stop = stop_rx.clone();
                tasks.spawn(async move { agent.run(stopped(stop)).await });
            }
            tasks.spawn(alert_roller(
                agent,
                vehicle,
                self.config.simulation.clone(),
                stop_rx.clone(),
            ));
        }
        info!(
            vehicles = self.config.simulation.vehicles,
            hz = self.config.vehicle.publish_hz,
            "🚀 simulation started"
        );

        shutdown.await;
        let _ = stop_tx.send(true);
        while let Some(joined) = tasks.join_next().await {
            joined??;
        }

        let stats = control_center.stats();
        info!(?stats, "🏁 simulation finished");
        Ok(stats)
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn operator_desk(
    control_center: Arc<ControlCenter>,
    mut takeovers: mpsc::Receiver<Alert>,
    stop: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let shutdown = stopped(stop);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            alert = takeovers.recv() => {
                let Some(alert) = alert else { return Ok(()) };
                let command = ControlCommand::new(
                    format!("takeover-{}-{}", alert.vehicle_id, alert.timestamp),
                    alert.vehicle_id.as_str(),
                    ControlAction::TeleoperationStart,
                );
                control_center.send_control(command).await?;
            }
        }
    }
}

async fn alert_roller(
    agent: Arc<VehicleAgent>,
    vehicle: Arc<SimulatedVehicle>,
    config: SimulationConfig,
    stop: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let period = Duration::from_secs(config.alert_interval_secs.max(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let shutdown = stopped(stop);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = ticker.tick() => {
                let roll = {
                    let mut rng = rand::thread_rng();
                    if rng.gen_bool(config.alert_probability) {
                        let reason = ALERT_REASONS.choose(&mut rng).copied().unwrap_or("unknown");
                        Some((reason, rng.gen_range(1..=3)))
                    } else {
                        None
                    }
                };
                if let Some((reason, severity)) = roll {
                    let (latitude, longitude) = vehicle.position();
                    agent.raise_alert(reason, latitude, longitude, severity).await?;
                }
            }
        }
    }
}
