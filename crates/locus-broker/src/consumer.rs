use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BrokerResult;
use crate::traits::{ConsumerId, Delivery, MessageBroker, ReceiptHandle};

/// An open consumer on one topic.
///
/// The broker-side consumer is closed by the first call to [`release`]; later
/// calls return `Ok(false)` without contacting the broker. A consumer that is
/// dropped unreleased is closed from a background task.
///
/// [`release`]: Consumer::release
pub struct Consumer {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    id: ConsumerId,
    released: AtomicBool,
}

impl Consumer {
    pub async fn open(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> BrokerResult<Self> {
        let topic = topic.into();
        let id = broker.open_consumer(&topic).await?;
        debug!(topic = %topic, consumer = %id, "consumer opened");
        Ok(Self {
            broker,
            topic,
            id,
            released: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub async fn receive(&self, wait: Duration) -> BrokerResult<Option<Delivery>> {
        self.broker.receive(&self.topic, &self.id, wait).await
    }

    pub async fn acknowledge(&self, receipt: &ReceiptHandle) -> BrokerResult<()> {
        self.broker.acknowledge(&self.topic, receipt).await
    }

    /// Close the broker-side consumer. Returns `Ok(true)` if this call did it.
    pub async fn release(&self) -> BrokerResult<bool> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.broker.close_consumer(&self.topic, &self.id).await?;
        debug!(topic = %self.topic, consumer = %self.id, "consumer released");
        Ok(true)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(topic = %self.topic, consumer = %self.id, "consumer dropped outside a runtime, not closed");
            return;
        };
        let broker = self.broker.clone();
        let topic = std::mem::take(&mut self.topic);
        let id = self.id.clone();
        handle.spawn(async move {
            if let Err(e) = broker.close_consumer(&topic, &id).await {
                warn!(topic = %topic, consumer = %id, error = %e, "failed to close dropped consumer");
            }
        });
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
