use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Broker-assigned id of a published message.
    MessageId
);
opaque_id!(
    /// Handle for one delivery of a message; required to acknowledge it.
    ///
    /// Every redelivery gets a new handle.
    ReceiptHandle
);
opaque_id!(
    /// An open receive session on a topic.
    ConsumerId
);

/// A message handed out by `receive`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub body: String,
}

/// Publish / receive / acknowledge transport shared by gateway and providers.
///
/// Implementations must be safe to share across tasks. Topics are created on
/// first use.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Append a message to `topic`.
    async fn publish(&self, topic: &str, body: String) -> BrokerResult<MessageId>;

    /// Open a consumer on `topic`.
    async fn open_consumer(&self, topic: &str) -> BrokerResult<ConsumerId>;

    /// Close a consumer. Closing twice is an error.
    async fn close_consumer(&self, topic: &str, consumer: &ConsumerId) -> BrokerResult<()>;

    /// Wait up to `wait` for a visible message.
    ///
    /// Returns `Ok(None)` if nothing became visible in time. The delivered
    /// message stays hidden for the visibility timeout and is redelivered
    /// unless acknowledged.
    async fn receive(
        &self,
        topic: &str,
        consumer: &ConsumerId,
        wait: Duration,
    ) -> BrokerResult<Option<Delivery>>;

    /// Delete a delivered message. Acknowledging an unknown or stale receipt
    /// is a no-op.
    async fn acknowledge(&self, topic: &str, receipt: &ReceiptHandle) -> BrokerResult<()>;

    /// Delete a message by the id `publish` returned, whether or not it is
    /// currently delivered. An unknown id is a no-op.
    async fn withdraw(&self, topic: &str, message: &MessageId) -> BrokerResult<()>;
}

/// Topic names are 1-80 characters of `[A-Za-z0-9_-]`.
pub fn validate_topic(topic: &str) -> BrokerResult<()> {
    let valid = !topic.is_empty()
        && topic.len() <= 80
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BrokerError::InvalidTopic(topic.to_string()))
    }
}
