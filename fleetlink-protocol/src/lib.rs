/*!
Wire messages and topic helpers shared by vehicles and the control center
*/

pub mod message;
pub mod topics;

pub use message::{
    Alert, ControlAction, ControlCommand, DrivingMode, Gear, ProtocolError, VehicleState, decode,
    encode, now_millis,
};
pub use topics::{Channel, DEFAULT_TOPIC_PREFIX, TopicScheme, topic_matches};
