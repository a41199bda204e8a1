/*!
Messages exchanged between vehicles and the control center, encoded as JSON
*/

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Errors raised while encoding or decoding wire messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Transmission gear, sent as an integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Gear {
    #[default]
    Unknown,
    Park,
    Drive,
    Reverse,
    Neutral,
}

impl From<i32> for Gear {
    fn from(code: i32) -> Self {
        match code {
            1 => Gear::Park,
            2 => Gear::Drive,
            3 => Gear::Reverse,
            4 => Gear::Neutral,
            _ => Gear::Unknown,
        }
    }
}

impl From<Gear> for i32 {
    fn from(gear: Gear) -> Self {
        match gear {
            Gear::Unknown => 0,
            Gear::Park => 1,
            Gear::Drive => 2,
            Gear::Reverse => 3,
            Gear::Neutral => 4,
        }
    }
}

/// Who is currently driving the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingMode {
    #[default]
    Autonomous,
    Manual,
    Teleoperation,
    #[serde(other)]
    Unknown,
}

/// Periodic state report published by a vehicle at 10-50 Hz
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleState {
    pub vehicle_id: String,
    /// Unix milliseconds, assigned by the vehicle
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// m/s
    pub speed: f32,
    /// Degrees, 0-360
    pub heading: f32,
    pub gear: Gear,
    /// 0-100
    pub battery_pct: f32,
    pub mode: DrivingMode,
    pub emergency: bool,
}

impl VehicleState {
    /// Create an autonomous-mode state stamped with the current time
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            timestamp: now_millis(),
            mode: DrivingMode::Autonomous,
            ..Default::default()
        }
    }
}

/// Action requested by the control center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    #[default]
    Stop,
    Resume,
    TeleoperationStart,
    #[serde(other)]
    Unknown,
}

/// Command published by the control center to a single vehicle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCommand {
    pub command_id: String,
    pub vehicle_id: String,
    /// Unix milliseconds, stamped when the command is sent
    pub timestamp: i64,
    pub action: ControlAction,
    pub target_speed: f32,
    pub target_heading: f32,
    /// JSON-encoded extra parameters
    pub payload: String,
}

impl ControlCommand {
    pub fn new(
        command_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        action: ControlAction,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            vehicle_id: vehicle_id.into(),
            action,
            ..Default::default()
        }
    }
}

/// Teleoperation alert raised by a vehicle that needs a human to take over
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub vehicle_id: String,
    /// Unix milliseconds
    pub timestamp: i64,
    /// Free-text reason code, e.g. `extreme_weather`
    pub reason: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 1 (low) to 3 (critical)
    pub severity: i32,
}

impl Alert {
    /// Build an unstamped alert; the sender fills in `timestamp`
    pub fn new(
        vehicle_id: impl Into<String>,
        reason: impl Into<String>,
        latitude: f64,
        longitude: f64,
        severity: i32,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            timestamp: 0,
            reason: reason.into(),
            latitude,
            longitude,
            severity,
        }
    }
}

/// Serialize a message to JSON bytes
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

/// Deserialize JSON bytes into a message
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_state_uses_wire_field_names() {
        let mut state = VehicleState::new("car-001");
        state.gear = Gear::Drive;
        state.battery_pct = 80.0;

        let value: serde_json::Value = serde_json::from_slice(&encode(&state).unwrap()).unwrap();
        assert_eq!(value["vehicle_id"], "car-001");
        assert_eq!(value["gear"], 2);
        assert_eq!(value["mode"], "autonomous");
        assert_eq!(value["battery_pct"], 80.0);
        assert_eq!(value["emergency"], false);
    }

    #[test]
    fn decode_fills_missing_fields_with_defaults() {
        let state: VehicleState =
            decode(br#"{"vehicle_id":"car-002","timestamp":1000}"#).unwrap();
        assert_eq!(state.vehicle_id, "car-002");
        assert_eq!(state.timestamp, 1000);
        assert_eq!(state.gear, Gear::Unknown);
        assert_eq!(state.mode, DrivingMode::Autonomous);
    }

    #[test]
    fn unknown_codes_decode_leniently() {
        let state: VehicleState =
            decode(br#"{"vehicle_id":"car-003","gear":42,"mode":"valet"}"#).unwrap();
        assert_eq!(state.gear, Gear::Unknown);
        assert_eq!(state.mode, DrivingMode::Unknown);

        let cmd: ControlCommand = decode(br#"{"vehicle_id":"car-003","action":"dance"}"#).unwrap();
        assert_eq!(cmd.action, ControlAction::Unknown);
    }

    #[test]
    fn control_action_is_snake_case() {
        let cmd = ControlCommand::new("cmd-1", "car-001", ControlAction::TeleoperationStart);
        let value: serde_json::Value = serde_json::from_slice(&encode(&cmd).unwrap()).unwrap();
        assert_eq!(value["action"], "teleoperation_start");
        assert_eq!(value["command_id"], "cmd-1");
    }

    #[test]
    fn new_alert_leaves_timestamp_for_sender() {
        let alert = Alert::new("car-001", "extreme_weather", 39.9042, 116.4074, 2);
        assert_eq!(alert.vehicle_id, "car-001");
        assert_eq!(alert.reason, "extreme_weather");
        assert_eq!(alert.severity, 2);
        assert_eq!(alert.timestamp, 0);
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode::<Alert>(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
