/*!
Configuration management for the bridge
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fleetlink_protocol::{DEFAULT_TOPIC_PREFIX, TopicScheme};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Topic naming
    pub topics: TopicConfig,
    /// Control-center behaviour
    pub control_center: ControlCenterConfig,
    /// Vehicle agent settings
    pub vehicle: VehicleConfig,
    /// Local fleet simulation
    pub simulation: SimulationConfig,
    /// Where alerts go besides the log
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Namespace in front of `{vehicle_id}/{channel}`
    pub prefix: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlCenterConfig {
    /// Identifies this control center in logs
    pub client_id: String,
    /// How often to log the shadow summary, in seconds
    pub summary_interval_secs: u64,
    /// Liveness window used by the summary, in seconds
    pub active_window_secs: u64,
}

impl Default for ControlCenterConfig {
    fn default() -> Self {
        Self {
            client_id: "control-center-01".to_string(),
            summary_interval_secs: 10,
            active_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Unique vehicle identifier, e.g. `car-001`
    pub vehicle_id: String,
    /// State publication frequency (10-50 Hz)
    pub publish_hz: f64,
}

impl VehicleConfig {
    /// One state every minute
    pub const MIN_PUBLISH_HZ: f64 = 1.0 / 60.0;
    pub const MAX_PUBLISH_HZ: f64 = 1000.0;
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vehicle_id: "car-001".to_string(),
            publish_hz: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated vehicles
    pub vehicles: usize,
    /// Seconds between alert rolls per vehicle
    pub alert_interval_secs: u64,
    /// Chance that a roll raises an alert, 0.0-1.0
    pub alert_probability: f64,
    /// Starting position of the fleet
    pub base_latitude: f64,
    pub base_longitude: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            vehicles: 3,
            alert_interval_secs: 5,
            alert_probability: 0.3,
            base_latitude: 39.9042,
            base_longitude: 116.4074,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    pub outputs: Vec<OutputConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            outputs: vec![OutputConfig {
                plugin: OutputPlugin::Terminal {
                    format: TerminalFormat::Colored,
                },
                enabled: true,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output plugin type
    #[serde(flatten)]
    pub plugin: OutputPlugin,
    /// Whether this output is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputPlugin {
    Json {
        path: PathBuf,
        #[serde(default)]
        pretty: bool,
    },
    Webhook {
        url: String,
        #[serde(default)]
        auth_token: Option<String>,
        #[serde(default = "default_queue_capacity")]
        queue_capacity: usize,
    },
    Terminal {
        #[serde(default)]
        format: TerminalFormat,
    },
}

fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalFormat {
    Plain,
    #[default]
    Colored,
    Json,
}

impl BridgeConfig {
    /// Read and validate a TOML config file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `~/.config/fleetlink/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fleetlink").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.topics.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(ConfigError::Invalid("topics.prefix must not be empty".into()));
        }
        if prefix.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "topics.prefix `{prefix}` must not contain wildcards"
            )));
        }
        if self.vehicle.vehicle_id.is_empty() {
            return Err(ConfigError::Invalid("vehicle.vehicle_id must not be empty".into()));
        }
        if self.vehicle.vehicle_id.contains(['/', '+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "vehicle.vehicle_id `{}` must be a single topic level",
                self.vehicle.vehicle_id
            )));
        }
        if !(VehicleConfig::MIN_PUBLISH_HZ..=VehicleConfig::MAX_PUBLISH_HZ)
            .contains(&self.vehicle.publish_hz)
        {
            return Err(ConfigError::Invalid(format!(
                "vehicle.publish_hz must be within {:.4}-{} Hz",
                VehicleConfig::MIN_PUBLISH_HZ,
                VehicleConfig::MAX_PUBLISH_HZ
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.alert_probability) {
            return Err(ConfigError::Invalid(
                "simulation.alert_probability must be within 0.0-1.0".into(),
            ));
        }
        for output in &self.alerts.outputs {
            if let OutputPlugin::Webhook { queue_capacity: 0, .. } = output.plugin {
                return Err(ConfigError::Invalid(
                    "webhook queue_capacity must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(self.topics.prefix.as_str())
    }
}
