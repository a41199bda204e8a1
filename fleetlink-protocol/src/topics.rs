/*!
Per-vehicle topic layout: `{prefix}/{vehicle_id}/{state|control|alert}`
*/

use std::fmt;

pub const DEFAULT_TOPIC_PREFIX: &str = "v1/vehicle";

/// The three per-vehicle channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    State,
    Control,
    Alert,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::State => "state",
            Channel::Control => "control",
            Channel::Alert => "alert",
        }
    }

    fn from_level(level: &str) -> Option<Self> {
        match level {
            "state" => Some(Channel::State),
            "control" => Some(Channel::Control),
            "alert" => Some(Channel::Alert),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds and parses topics under a common prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

impl TopicScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic(&self, vehicle_id: &str, channel: Channel) -> String {
        format!("{}/{}/{}", self.prefix, vehicle_id, channel)
    }

    /// `{prefix}/{id}/state`
    pub fn state_topic(&self, vehicle_id: &str) -> String {
        self.topic(vehicle_id, Channel::State)
    }

    /// `{prefix}/{id}/control`
    pub fn control_topic(&self, vehicle_id: &str) -> String {
        self.topic(vehicle_id, Channel::Control)
    }

    /// `{prefix}/{id}/alert`
    pub fn alert_topic(&self, vehicle_id: &str) -> String {
        self.topic(vehicle_id, Channel::Alert)
    }

    /// Broker-side filter matching one channel of every vehicle: `{prefix}/+/{channel}`
    pub fn wildcard(&self, channel: Channel) -> String {
        self.topic("+", channel)
    }

    /// Split a concrete topic into its vehicle id and channel
    pub fn parse<'a>(&self, topic: &'a str) -> Option<(&'a str, Channel)> {
        let rest = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let (vehicle_id, channel) = rest.split_once('/')?;
        if vehicle_id.is_empty() {
            return None;
        }
        Some((vehicle_id, Channel::from_level(channel)?))
    }
}

/// MQTT-style filter matching: `+` matches one level, a trailing `#` matches
/// the parent level and everything below it.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for pattern in filter.split('/') {
        match pattern {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            exact => {
                if levels.next() != Some(exact) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_per_vehicle_topics() {
        let topics = TopicScheme::default();
        assert_eq!(topics.state_topic("car-001"), "v1/vehicle/car-001/state");
        assert_eq!(topics.control_topic("car-001"), "v1/vehicle/car-001/control");
        assert_eq!(topics.alert_topic("car-001"), "v1/vehicle/car-001/alert");
        assert_eq!(topics.wildcard(Channel::State), "v1/vehicle/+/state");
        assert_eq!(topics.wildcard(Channel::Alert), "v1/vehicle/+/alert");
    }

    #[test]
    fn trailing_slash_in_prefix_is_ignored() {
        let topics = TopicScheme::new("fleet/eu/");
        assert_eq!(topics.state_topic("bus-7"), "fleet/eu/bus-7/state");
    }

    #[test]
    fn parses_vehicle_id_and_channel() {
        let topics = TopicScheme::default();
        assert_eq!(
            topics.parse("v1/vehicle/car-001/alert"),
            Some(("car-001", Channel::Alert))
        );
        assert_eq!(topics.parse("v1/vehicle//state"), None);
        assert_eq!(topics.parse("v1/vehicle/car-001/telemetry"), None);
        assert_eq!(topics.parse("v2/vehicle/car-001/state"), None);
        assert_eq!(topics.parse("v1/vehicle/car-001/state/extra"), None);
    }

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("v1/vehicle/+/state", "v1/vehicle/car-001/state"));
        assert!(!topic_matches("v1/vehicle/+/state", "v1/vehicle/car-001/alert"));
        assert!(!topic_matches("v1/vehicle/+/state", "v1/vehicle/state"));
        assert!(!topic_matches("v1/vehicle/+/state", "v1/vehicle/a/b/state"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches("v1/#", "v1/vehicle/car-001/state"));
        assert!(topic_matches("v1/vehicle/#", "v1/vehicle"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("v2/#", "v1/vehicle"));
    }

    #[test]
    fn exact_filters_match_whole_topic_only() {
        assert!(topic_matches("v1/vehicle/car-001/control", "v1/vehicle/car-001/control"));
        assert!(!topic_matches("v1/vehicle/car-001", "v1/vehicle/car-001/control"));
    }
}
