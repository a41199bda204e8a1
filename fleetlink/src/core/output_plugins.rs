/*!
Alert outputs: terminal, JSON lines file and webhook listeners
*/

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

use fleetlink_protocol::Alert;

use crate::core::{
    alert_hub::{AlertHub, AlertListener, AlertTier, ListenerHandle},
    config::{OutputConfig, OutputPlugin, TerminalFormat},
    error::BridgeError,
};

/// Register every enabled output on `hub`, in configuration order
pub fn install_outputs(
    hub: &AlertHub,
    configs: &[OutputConfig],
) -> Result<Vec<ListenerHandle>, BridgeError> {
    let mut handles = Vec::new();

    for config in configs.iter().filter(|config| config.enabled) {
        let handle = match &config.plugin {
            OutputPlugin::Json { path, pretty } => {
                hub.register(JsonLinesSink::open(path.clone(), *pretty)?)
            }
            OutputPlugin::Webhook {
                url,
                auth_token,
                queue_capacity,
            } => hub.register(WebhookSink::spawn(
                url.clone(),
                auth_token.clone(),
                *queue_capacity,
            )),
            OutputPlugin::Terminal { format } => hub.register(TerminalSink::new(*format)),
        };
        handles.push(handle);
    }

    info!("Installed {} alert outputs", handles.len());
    Ok(handles)
}

fn format_time(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Prints alerts to stdout
pub struct TerminalSink {
    format: TerminalFormat,
}

impl TerminalSink {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    fn format_alert(&self, alert: &Alert) -> String {
        let tier = AlertTier::classify(alert.severity);
        match self.format {
            TerminalFormat::Plain => format!(
                "ALERT [{:?}] vehicle {} at {}: {} (severity {}, lat={:.6} lon={:.6})",
                tier,
                alert.vehicle_id,
                format_time(alert.timestamp),
                alert.reason,
                alert.severity,
                alert.latitude,
                alert.longitude
            ),
            TerminalFormat::Colored => {
                let color = match tier {
                    AlertTier::Critical => "\x1b[31m",
                    AlertTier::Advisory => "\x1b[33m",
                };
                format!(
                    "{color}🚨 {:?} ALERT\x1b[0m\n\
                     \x1b[36m🚗 Vehicle:\x1b[0m {}\n\
                     \x1b[36m⏰ Timestamp:\x1b[0m {}\n\
                     \x1b[36m📝 Reason:\x1b[0m {}\n\
                     \x1b[36m🎯 Severity:\x1b[0m {}\n\
                     \x1b[36m📍 Location:\x1b[0m {:.6}, {:.6}",
                    tier,
                    alert.vehicle_id,
                    format_time(alert.timestamp),
                    alert.reason,
                    alert.severity,
                    alert.latitude,
                    alert.longitude
                )
            }
            TerminalFormat::Json => serde_json::to_string_pretty(alert)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }
}

impl AlertListener for TerminalSink {
    fn on_alert(&self, alert: &Alert) {
        println!("{}", self.format_alert(alert));
        println!();
    }
}

/// Appends one JSON document per alert to a file
pub struct JsonLinesSink {
    path: PathBuf,
    pretty: bool,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: PathBuf, pretty: bool) -> Result<Self, BridgeError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            pretty,
            file: Mutex::new(file),
        })
    }

    fn write_alert(&self, alert: &Alert) -> Result<(), BridgeError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(alert)
        } else {
            serde_json::to_string(alert)
        }
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = self.file.lock();
        writeln!(file, "{}", json)?;
        file.flush()?;
        Ok(())
    }
}

impl AlertListener for JsonLinesSink {
    fn on_alert(&self, alert: &Alert) {
        if let Err(e) = self.write_alert(alert) {
            error!(path = ?self.path, error = %e, "failed to record alert");
        }
    }
}

/// Forwards alerts to an HTTP endpoint from a background task.
///
/// `on_alert` never blocks: alerts go onto a bounded queue and are dropped
/// when it is full.
pub struct WebhookSink {
    queue: mpsc::Sender<Alert>,
}

impl WebhookSink {
    /// Start the delivery task. Must be called inside a Tokio runtime.
    pub fn spawn(url: String, auth_token: Option<String>, queue_capacity: usize) -> Self {
        let (queue, mut pending) = mpsc::channel::<Alert>(queue_capacity.max(1));
        let client = reqwest::Client::new();

        tokio::spawn(async move {
            while let Some(alert) = pending.recv().await {
                let mut request = client.post(&url);
                if let Some(ref token) = auth_token {
                    request = request.header("Authorization", format!("Bearer {}", token));
                }

                match request.json(&alert).send().await {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => warn!(
                        %url,
                        status = %response.status(),
                        vehicle_id = %alert.vehicle_id,
                        "webhook rejected alert"
                    ),
                    Err(e) => warn!(%url, error = %e, "webhook delivery failed"),
                }
            }
        });

        Self { queue }
    }
}

impl AlertListener for WebhookSink {
    fn on_alert(&self, alert: &Alert) {
        match self.queue.try_send(alert.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => warn!(
                vehicle_id = %dropped.vehicle_id,
                "webhook queue full, dropping alert"
            ),
            Err(TrySendError::Closed(_)) => error!("webhook delivery task has stopped"),
        }
    }
}
