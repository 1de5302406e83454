use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::traits::{validate_topic, ConsumerId, Delivery, MessageBroker, MessageId, ReceiptHandle};

/// Queue behaviour shared by every topic of an [`InMemoryBroker`].
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// How long a delivered, unacknowledged message stays hidden.
    pub visibility_timeout: Duration,
    /// Messages older than this are dropped, acknowledged or not.
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_millis(250),
            retention: Duration::from_secs(60),
        }
    }
}

/// Counters for observing broker activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    pub acknowledged: u64,
    /// Messages deleted by id through `withdraw`.
    pub withdrawn: u64,
    pub consumers_opened: u64,
    pub consumers_closed: u64,
    /// Close requests for consumers that were unknown or already closed.
    pub rejected_closes: u64,
}

struct StoredMessage {
    id: MessageId,
    body: String,
    published_at: Instant,
    invisible_until: Option<Instant>,
    receipt: Option<ReceiptHandle>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct TopicState {
    messages: VecDeque<StoredMessage>,
    consumers: HashSet<ConsumerId>,
}

impl TopicState {
    fn purge_expired(&mut self, now: Instant, retention: Duration) {
        self.messages.retain(|m| now.duration_since(m.published_at) < retention);
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    stats: BrokerStats,
}

/// In-process broker with SQS-style visibility-timeout queues.
///
/// All state sits behind one `Mutex`; critical sections never await. Waiting
/// receivers park on a [`Notify`] that is signalled on publish and on consumer
/// close, and otherwise wake when the next hidden message becomes visible.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    config: QueueConfig,
}

enum Poll {
    Ready(Delivery),
    /// Nothing visible; the earliest instant a hidden message reappears.
    Pending(Option<Instant>),
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of consumers currently open on `topic`.
    pub fn open_consumers(&self, topic: &str) -> usize {
        let state = self.state.lock().expect("broker lock poisoned");
        state.topics.get(topic).map_or(0, |t| t.consumers.len())
    }

    /// Number of retained messages on `topic`, visible or not.
    pub fn pending(&self, topic: &str) -> usize {
        let mut state = self.state.lock().expect("broker lock poisoned");
        let retention = self.config.retention;
        state.topics.get_mut(topic).map_or(0, |t| {
            t.purge_expired(Instant::now(), retention);
            t.messages.len()
        })
    }

    pub fn stats(&self) -> BrokerStats {
        self.state.lock().expect("broker lock poisoned").stats
    }

    fn try_take(&self, topic: &str, consumer: &ConsumerId) -> BrokerResult<Poll> {
        let mut guard = self.state.lock().expect("broker lock poisoned");
        let state = &mut *guard;
        let now = Instant::now();

        let Some(queue) = state.topics.get_mut(topic).filter(|t| t.consumers.contains(consumer))
        else {
            return Err(BrokerError::ConsumerClosed {
                topic: topic.to_string(),
                consumer: consumer.to_string(),
            });
        };
        queue.purge_expired(now, self.config.retention);

        if let Some(message) = queue.messages.iter_mut().find(|m| m.is_visible(now)) {
            let receipt = ReceiptHandle::generate();
            message.invisible_until = Some(now + self.config.visibility_timeout);
            message.receipt = Some(receipt.clone());
            state.stats.delivered += 1;
            return Ok(Poll::Ready(Delivery {
                message_id: message.id.clone(),
                receipt,
                body: message.body.clone(),
            }));
        }

        let next_visible = queue.messages.iter().filter_map(|m| m.invisible_until).min();
        Ok(Poll::Pending(next_visible))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, body: String) -> BrokerResult<MessageId> {
        validate_topic(topic)?;
        let id = MessageId::generate();
        {
            let mut state = self.state.lock().expect("broker lock poisoned");
            state.stats.published += 1;
            let now = Instant::now();
            // Topics nobody receives from are only trimmed here.
            let queue = state.topics.entry(topic.to_string()).or_default();
            queue.purge_expired(now, self.config.retention);
            queue.messages.push_back(StoredMessage {
                id: id.clone(),
                body,
                published_at: now,
                invisible_until: None,
                receipt: None,
            });
        }
        self.notify.notify_waiters();
        debug!(topic, message_id = %id, "message published");
        Ok(id)
    }

    async fn open_consumer(&self, topic: &str) -> BrokerResult<ConsumerId> {
        validate_topic(topic)?;
        let id = ConsumerId::generate();
        let mut state = self.state.lock().expect("broker lock poisoned");
        state.stats.consumers_opened += 1;
        state.topics.entry(topic.to_string()).or_default().consumers.insert(id.clone());
        Ok(id)
    }

    async fn close_consumer(&self, topic: &str, consumer: &ConsumerId) -> BrokerResult<()> {
        let removed = {
            let mut state = self.state.lock().expect("broker lock poisoned");
            let removed = state
                .topics
                .get_mut(topic)
                .is_some_and(|t| t.consumers.remove(consumer));
            if removed {
                state.stats.consumers_closed += 1;
            } else {
                state.stats.rejected_closes += 1;
            }
            removed
        };
        if !removed {
            return Err(BrokerError::ConsumerClosed {
                topic: topic.to_string(),
                consumer: consumer.to_string(),
            });
        }
        // Receivers parked on this consumer re-check and fail fast.
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        consumer: &ConsumerId,
        wait: Duration,
    ) -> BrokerResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before looking, so a publish between the
            // check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_visible = match self.try_take(topic, consumer)? {
                Poll::Ready(delivery) => return Ok(Some(delivery)),
                Poll::Pending(next_visible) => next_visible,
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, topic: &str, receipt: &ReceiptHandle) -> BrokerResult<()> {
        let mut guard = self.state.lock().expect("broker lock poisoned");
        let state = &mut *guard;
        if let Some(queue) = state.topics.get_mut(topic) {
            let before = queue.messages.len();
            queue.messages.retain(|m| m.receipt.as_ref() != Some(receipt));
            if queue.messages.len() < before {
                state.stats.acknowledged += 1;
            }
        }
        Ok(())
    }

    async fn withdraw(&self, topic: &str, message: &MessageId) -> BrokerResult<()> {
        let mut guard = self.state.lock().expect("broker lock poisoned");
        let state = &mut *guard;
        if let Some(queue) = state.topics.get_mut(topic) {
            let before = queue.messages.len();
            queue.messages.retain(|m| &m.id != message);
            if queue.messages.len() < before {
                state.stats.withdrawn += 1;
            }
        }
        Ok(())
    }
}
