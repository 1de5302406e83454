use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use locus_broker::{Consumer, MessageBroker, DEFAULT_QUERY_TOPIC, DEFAULT_REPLY_TOPIC};
use locus_types::{LocationQuery, LocationReply, ObjectName, RequestId};

use crate::correlation::{QueryScope, QueryState};
use crate::error::{ClusterError, ClusterResult};

/// Pause after a failed broker call before the listener polls again.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Discovery settings shared by requesters and responders.
#[derive(Clone, Debug)]
pub struct LocateConfig {
    pub query_topic: String,
    pub reply_topic: String,
    /// How long a query waits for its reply before it expires.
    pub timeout: Duration,
    /// Long-poll window of a single broker receive.
    pub poll_wait: Duration,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            query_topic: DEFAULT_QUERY_TOPIC.into(),
            reply_topic: DEFAULT_REPLY_TOPIC.into(),
            timeout: Duration::from_secs(5),
            poll_wait: Duration::from_millis(250),
        }
    }
}

/// Gateway side of location discovery.
///
/// Each call to [`locate`] is one query: a fresh request id, one published
/// query message, a reply listener task and a timeout task, both bound to a
/// [`QueryScope`].
///
/// [`locate`]: LocationRequester::locate
#[derive(Clone)]
pub struct LocationRequester {
    broker: Arc<dyn MessageBroker>,
    config: LocateConfig,
}

impl LocationRequester {
    pub fn new(broker: Arc<dyn MessageBroker>, config: LocateConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &LocateConfig {
        &self.config
    }

    /// Find the address of the provider holding `name`.
    ///
    /// Fails with `NotFound` if no matching reply arrives within the
    /// configured timeout; an absent object and a lost reply look the same.
    pub async fn locate(&self, name: &ObjectName) -> ClusterResult<String> {
        self.locate_with_id(name, RequestId::generate()).await
    }

    async fn locate_with_id(&self, name: &ObjectName, request_id: RequestId) -> ClusterResult<String> {
        let body = LocationQuery::new(name.clone(), request_id.clone()).encode()?;
        let consumer = Arc::new(Consumer::open(self.broker.clone(), &self.config.reply_topic).await?);

        let query_id = match self.broker.publish(&self.config.query_topic, body).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(release_err) = consumer.release().await {
                    warn!(error = %release_err, "failed to release reply consumer");
                }
                return Err(e.into());
            }
        };
        debug!(object = %name, request_id = %request_id, message_id = %query_id, "location query issued");

        let scope = QueryScope::new(consumer.clone());
        let (tx, rx) = oneshot::channel();

        let listener = ReplyListener {
            scope: scope.clone(),
            consumer,
            name: name.clone(),
            request_id: request_id.clone(),
            poll_wait: self.config.poll_wait,
        };
        tokio::spawn(listener.run(tx));
        let timer = tokio::spawn(expire_after(scope.clone(), self.config.timeout));

        match rx.await {
            Ok(address) => {
                timer.abort();
                info!(object = %name, request_id = %request_id, provider = %address, "object located");
                Ok(address)
            }
            Err(_) => {
                debug!(object = %name, request_id = %request_id, state = ?scope.state(), "location query ended unresolved");
                // Unanswered queries would otherwise circulate among the
                // providers until retention drops them.
                if let Err(e) = self.broker.withdraw(&self.config.query_topic, &query_id).await {
                    warn!(request_id = %request_id, error = %e, "failed to withdraw expired query");
                }
                Err(ClusterError::NotFound(name.clone()))
            }
        }
    }
}

impl std::fmt::Debug for LocationRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationRequester").field("config", &self.config).finish()
    }
}

/// Expire the query after `timeout` unless it settles first.
async fn expire_after(scope: Arc<QueryScope>, timeout: Duration) {
    tokio::select! {
        _ = scope.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            if scope.settle(QueryState::Expired) {
                info!(timeout_ms = timeout.as_millis() as u64, "location query expired");
                scope.close().await;
            }
        }
    }
}

/// Receive-and-filter loop over the shared reply topic for one query.
struct ReplyListener {
    scope: Arc<QueryScope>,
    consumer: Arc<Consumer>,
    name: ObjectName,
    request_id: RequestId,
    poll_wait: Duration,
}

impl ReplyListener {
    /// Runs until the scope is cancelled or this query's reply arrives. The
    /// address is sent on `tx` only if this listener resolved the query.
    async fn run(self, tx: oneshot::Sender<String>) {
        loop {
            let received = tokio::select! {
                _ = self.scope.cancelled() => return,
                received = self.consumer.receive(self.poll_wait) => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    if self.scope.is_cancelled() {
                        return;
                    }
                    warn!(request_id = %self.request_id, error = %e, "reply receive failed");
                    tokio::select! {
                        _ = self.scope.cancelled() => return,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => continue,
                    }
                }
            };

            let reply = match LocationReply::decode(&delivery.body) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(message_id = %delivery.message_id, error = %e, "discarding undecodable reply");
                    continue;
                }
            };
            if !reply.answers(&self.name, &self.request_id) {
                // Someone else's reply; it becomes visible again to its owner.
                trace!(request_id = %self.request_id, other = %reply.request_id, "reply for another query");
                continue;
            }

            let resolved = self.scope.settle(QueryState::Resolved(reply.address.clone()));
            if resolved {
                let _ = tx.send(reply.address);
            } else {
                debug!(request_id = %self.request_id, "late reply for an expired query");
            }
            if let Err(e) = self.consumer.acknowledge(&delivery.receipt).await {
                warn!(request_id = %self.request_id, error = %e, "failed to acknowledge reply");
            }
            if resolved {
                self.scope.close().await;
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use locus_broker::{
        BrokerResult, ConsumerId, Delivery, InMemoryBroker, MessageId, QueueConfig, ReceiptHandle,
    };
    use std::time::Instant;

    fn name(s: &str) -> ObjectName {
        ObjectName::new(s).unwrap()
    }

    fn config(timeout_ms: u64) -> LocateConfig {
        LocateConfig {
            timeout: Duration::from_millis(timeout_ms),
            poll_wait: Duration::from_millis(50),
            ..LocateConfig::default()
        }
    }

    fn fast_broker() -> Arc<InMemoryBroker> {
        Arc::new(InMemoryBroker::with_config(QueueConfig {
            visibility_timeout: Duration::from_millis(20),
            retention: Duration::from_secs(30),
        }))
    }

    /// Answers every query on the query topic with `address_for(query)`.
    fn spawn_fake_provider(
        broker: Arc<InMemoryBroker>,
        address_for: impl Fn(&LocationQuery) -> Option<String> + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let cfg = LocateConfig::default();
            let consumer = Consumer::open(broker.clone(), &cfg.query_topic).await.unwrap();
            loop {
                let Ok(Some(d)) = consumer.receive(Duration::from_millis(50)).await else {
                    continue;
                };
                let query = LocationQuery::decode(&d.body).unwrap();
                if let Some(address) = address_for(&query) {
                    let reply = query.reply_from(address).encode().unwrap();
                    broker.publish(&cfg.reply_topic, reply).await.unwrap();
                    consumer.acknowledge(&d.receipt).await.unwrap();
                }
            }
        })
    }

    #[tokio::test]
    async fn resolves_with_matching_reply() {
        let broker = fast_broker();
        let provider = spawn_fake_provider(broker.clone(), |_| Some("p:1".into()));
        let requester = LocationRequester::new(broker.clone(), config(2_000));

        let address = requester.locate(&name("report.csv")).await.unwrap();
        assert_eq!(address, "p:1");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.open_consumers(DEFAULT_REPLY_TOPIC), 0);
        assert_eq!(broker.pending(DEFAULT_REPLY_TOPIC), 0);
        provider.abort();
    }

    #[tokio::test]
    async fn unknown_object_expires_within_bound() {
        let broker = fast_broker();
        let requester = LocationRequester::new(broker.clone(), config(200));

        let start = Instant::now();
        let result = requester.locate(&name("missing")).await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(ClusterError::NotFound(_))));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.open_consumers(DEFAULT_REPLY_TOPIC), 0);
        assert_eq!(broker.stats().rejected_closes, 0);
        assert_eq!(broker.pending(DEFAULT_QUERY_TOPIC), 0);
        assert_eq!(broker.stats().withdrawn, 1);
    }

    #[tokio::test]
    async fn expired_query_stops_circulating() {
        let broker = fast_broker();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let provider = {
            let seen = seen.clone();
            spawn_fake_provider(broker.clone(), move |_| {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                None
            })
        };
        let requester = LocationRequester::new(broker.clone(), config(150));

        let result = requester.locate(&name("nobody-has-it")).await;
        assert!(matches!(result, Err(ClusterError::NotFound(_))));
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst) >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = seen.load(std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), settled);
        assert_eq!(broker.pending(DEFAULT_QUERY_TOPIC), 0);
        provider.abort();
    }

    #[tokio::test]
    async fn reply_for_another_request_is_never_taken() {
        let broker = fast_broker();
        let requester = LocationRequester::new(broker.clone(), config(1_500));
        let r1 = RequestId::generate();
        let r2 = RequestId::generate();

        // Only R1 is ever answered.
        let answered = r1.clone();
        let provider = spawn_fake_provider(broker.clone(), move |q| {
            (q.request_id == answered).then(|| "holder:1".to_string())
        });

        let same = name("same");
        let (a, b) = tokio::join!(
            requester.locate_with_id(&same, r1),
            requester.locate_with_id(&same, r2),
        );
        assert_eq!(a.unwrap(), "holder:1");
        assert!(matches!(b, Err(ClusterError::NotFound(_))));
        provider.abort();
    }

    #[tokio::test]
    async fn concurrent_queries_get_their_own_replies() {
        let broker = fast_broker();
        let requester = LocationRequester::new(broker.clone(), config(3_000));
        let provider = spawn_fake_provider(broker.clone(), |q| Some(format!("{}@{}", q.name, q.request_id)));

        // Half the lookups share one name, the rest each ask for their own.
        let queries: Vec<(ObjectName, RequestId)> = (0..8)
            .map(|i| {
                let object = if i % 2 == 0 { name("shared") } else { name(&format!("own-{i}")) };
                (object, RequestId::generate())
            })
            .collect();
        let lookups = queries.iter().map(|(object, id)| {
            let requester = requester.clone();
            let (object, id) = (object.clone(), id.clone());
            async move { requester.locate_with_id(&object, id).await }
        });
        let results = join_spawned(lookups).await;

        for ((object, id), result) in queries.iter().zip(results) {
            assert_eq!(result.unwrap(), format!("{object}@{id}"));
        }
        provider.abort();
    }

    #[tokio::test]
    async fn stale_reply_after_expiry_is_ignored() {
        let broker = fast_broker();
        let requester = LocationRequester::new(broker.clone(), config(100));
        let id = RequestId::generate();

        let result = requester.locate_with_id(&name("slow"), id.clone()).await;
        assert!(matches!(result, Err(ClusterError::NotFound(_))));

        // The holder answers too late; the reply stays unclaimed.
        let late = LocationQuery::new(name("slow"), id).reply_from("late:1");
        broker.publish(DEFAULT_REPLY_TOPIC, late.encode().unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.pending(DEFAULT_REPLY_TOPIC), 1);
        assert_eq!(broker.open_consumers(DEFAULT_REPLY_TOPIC), 0);
    }

    /// Broker that silently drops everything published on the reply topic.
    struct DroppingReplies(Arc<InMemoryBroker>);

    #[async_trait]
    impl MessageBroker for DroppingReplies {
        async fn publish(&self, topic: &str, body: String) -> BrokerResult<MessageId> {
            if topic == DEFAULT_REPLY_TOPIC {
                return Ok(MessageId::generate());
            }
            self.0.publish(topic, body).await
        }
        async fn open_consumer(&self, topic: &str) -> BrokerResult<ConsumerId> {
            self.0.open_consumer(topic).await
        }
        async fn close_consumer(&self, topic: &str, consumer: &ConsumerId) -> BrokerResult<()> {
            self.0.close_consumer(topic, consumer).await
        }
        async fn receive(
            &self,
            topic: &str,
            consumer: &ConsumerId,
            wait: Duration,
        ) -> BrokerResult<Option<Delivery>> {
            self.0.receive(topic, consumer, wait).await
        }
        async fn acknowledge(&self, topic: &str, receipt: &ReceiptHandle) -> BrokerResult<()> {
            self.0.acknowledge(topic, receipt).await
        }
        async fn withdraw(&self, topic: &str, message: &MessageId) -> BrokerResult<()> {
            self.0.withdraw(topic, message).await
        }
    }

    #[tokio::test]
    async fn dropped_reply_ends_at_timeout() {
        let inner = fast_broker();
        let lossy = Arc::new(DroppingReplies(inner.clone()));

        // The provider "answers" through the lossy broker.
        let provider = {
            let lossy = lossy.clone();
            tokio::spawn(async move {
                let cfg = LocateConfig::default();
                let consumer = Consumer::open(lossy.clone(), &cfg.query_topic).await.unwrap();
                loop {
                    if let Ok(Some(d)) = consumer.receive(Duration::from_millis(50)).await {
                        let query = LocationQuery::decode(&d.body).unwrap();
                        let reply = query.reply_from("holder:1").encode().unwrap();
                        lossy.publish(&cfg.reply_topic, reply).await.unwrap();
                        consumer.acknowledge(&d.receipt).await.unwrap();
                    }
                }
            })
        };

        let requester = LocationRequester::new(lossy, config(250));
        let start = Instant::now();
        let result = requester.locate(&name("report.csv")).await;
        assert!(matches!(result, Err(ClusterError::NotFound(_))));
        assert!(start.elapsed() < Duration::from_millis(800));
        provider.abort();
    }

    async fn join_spawned<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.await.unwrap());
        }
        out
    }
}
