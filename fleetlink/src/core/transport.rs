/*!
Publish/subscribe transport seam and an in-process broker implementation
*/

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

use fleetlink_protocol::topic_matches;

/// A payload published on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Messages matching one subscription filter, in publish order
pub type Subscription = Pin<Box<dyn Stream<Item = Message> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid publish topic `{0}`")]
    InvalidTopic(String),
    #[error("invalid subscription filter `{0}`")]
    InvalidFilter(String),
}

/// Delivery, reconnection and authentication all live behind this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name of the transport, for logs
    fn name(&self) -> &'static str;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe with an MQTT-style filter (`+` and trailing `#`)
    async fn subscribe(&self, filter: &str) -> Result<Subscription, TransportError>;
}

/// In-process broker. Every subscriber sees every message published after it
/// subscribed; a subscriber that falls more than `capacity` messages behind
/// skips the backlog.
#[derive(Debug, Clone)]
pub struct LocalBroker {
    sender: broadcast::Sender<Message>,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LocalBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

#[async_trait]
impl Transport for LocalBroker {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !valid_topic(topic) {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }
        let message = Message {
            topic: topic.to_string(),
            payload,
        };
        if self.sender.send(message).is_err() {
            trace!(topic, "published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<Subscription, TransportError> {
        if !valid_filter(filter) {
            return Err(TransportError::InvalidFilter(filter.to_string()));
        }
        let mut receiver = self.sender.subscribe();
        let filter = filter.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if topic_matches(&filter, &message.topic) {
                            yield message;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%filter, skipped, "subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

fn valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#'])
}

fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    levels.iter().enumerate().all(|(index, level)| match *level {
        "+" => true,
        "#" => index == levels.len() - 1,
        other => !other.contains(['+', '#']),
    })
}
