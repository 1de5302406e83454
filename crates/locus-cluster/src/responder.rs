use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use locus_broker::{Consumer, Delivery, MessageBroker};
use locus_store::ProviderStore;
use locus_types::LocationQuery;

use crate::error::{ClusterError, ClusterResult};
use crate::requester::LocateConfig;

/// Pause after a failed receive before polling again.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// What the responder did with one query message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The object is held here; a reply was published.
    Answered,
    /// The object is not held here; the query is left for other providers.
    NotHeld,
    /// The message was not a valid query and was dropped from the queue.
    Discarded,
}

/// Provider side of location discovery.
///
/// Consumes the query topic for as long as it runs. A query for an object in
/// the local store is answered with this provider's address and removed from
/// the queue; other queries are left alone so that the broker redelivers them
/// to the remaining providers.
pub struct LocationResponder {
    broker: Arc<dyn MessageBroker>,
    store: Arc<dyn ProviderStore>,
    address: String,
    config: LocateConfig,
}

impl LocationResponder {
    /// `address` is what the gateway should contact, as published in replies.
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        store: Arc<dyn ProviderStore>,
        address: impl Into<String>,
        config: LocateConfig,
    ) -> Self {
        Self {
            broker,
            store,
            address: address.into(),
            config,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Serve queries until `shutdown` is cancelled.
    ///
    /// Broker errors are logged and retried; only failing to open or close
    /// the consumer is returned.
    pub async fn run(&self, shutdown: CancellationToken) -> ClusterResult<()> {
        let consumer = Consumer::open(self.broker.clone(), &self.config.query_topic).await?;
        info!(topic = %self.config.query_topic, address = %self.address, "location responder started");

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = consumer.receive(self.config.poll_wait) => received,
            };
            match received {
                Ok(Some(delivery)) => {
                    self.handle(&consumer, delivery).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "query receive failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                    }
                }
            }
        }

        consumer.release().await?;
        info!("location responder stopped");
        Ok(())
    }

    /// Handle one delivered query message.
    pub async fn handle(&self, consumer: &Consumer, delivery: Delivery) -> QueryOutcome {
        let query = match LocationQuery::decode(&delivery.body) {
            Ok(query) => query,
            Err(e) => {
                warn!(message_id = %delivery.message_id, error = %e, "dropping malformed query");
                if let Err(e) = consumer.acknowledge(&delivery.receipt).await {
                    warn!(error = %e, "failed to delete malformed query");
                }
                return QueryOutcome::Discarded;
            }
        };

        let held = match self.store.exists(&query.name).await {
            Ok(held) => held,
            Err(e) => {
                warn!(object = %query.name, error = %e, "existence check failed");
                false
            }
        };
        if !held {
            debug!(object = %query.name, request_id = %query.request_id, "object not held here");
            return QueryOutcome::NotHeld;
        }

        let reply = query.reply_from(self.address.clone());
        let publish = async {
            let body = reply.encode()?;
            self.broker.publish(&self.config.reply_topic, body).await?;
            Ok::<(), ClusterError>(())
        };
        // Other responders may race to delete the same query; the broker
        // arbitrates and a failed delete is harmless.
        let delete = consumer.acknowledge(&delivery.receipt);
        let (published, deleted) = tokio::join!(publish, delete);

        if let Err(e) = published {
            warn!(object = %query.name, request_id = %query.request_id, error = %e, "failed to publish location reply");
        }
        if let Err(e) = deleted {
            warn!(request_id = %query.request_id, error = %e, "failed to delete answered query");
        }
        info!(object = %query.name, request_id = %query.request_id, "answered location query");
        QueryOutcome::Answered
    }
}

impl std::fmt::Debug for LocationResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResponder")
            .field("address", &self.address)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::LocationRequester;
    use locus_broker::{InMemoryBroker, QueueConfig};
    use locus_store::FsObjectStore;
    use locus_types::{LocationReply, ObjectName, RequestId};
    use tokio::io::AsyncWriteExt;

    fn name(s: &str) -> ObjectName {
        ObjectName::new(s).unwrap()
    }

    fn config() -> LocateConfig {
        LocateConfig {
            timeout: Duration::from_millis(1_500),
            poll_wait: Duration::from_millis(50),
            ..LocateConfig::default()
        }
    }

    fn broker() -> Arc<InMemoryBroker> {
        Arc::new(InMemoryBroker::with_config(QueueConfig {
            visibility_timeout: Duration::from_millis(20),
            retention: Duration::from_secs(30),
        }))
    }

    async fn store_with(dir: &std::path::Path, objects: &[&str]) -> Arc<FsObjectStore> {
        let store = FsObjectStore::open(dir).await.unwrap();
        for object in objects {
            let mut w = store.create_write(&name(object)).await.unwrap();
            w.write_all(b"data").await.unwrap();
            w.shutdown().await.unwrap();
        }
        Arc::new(store)
    }

    async fn deliver(broker: &Arc<InMemoryBroker>, consumer: &Consumer, body: String) -> Delivery {
        broker.publish(&config().query_topic, body).await.unwrap();
        consumer.receive(Duration::from_millis(100)).await.unwrap().expect("query delivered")
    }

    #[tokio::test]
    async fn answers_query_for_held_object() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker();
        let store = store_with(dir.path(), &["report.csv"]).await;
        let responder = LocationResponder::new(broker.clone(), store, "p:1", config());
        let consumer = Consumer::open(broker.clone(), &config().query_topic).await.unwrap();

        let request_id = RequestId::generate();
        let body = LocationQuery::new(name("report.csv"), request_id.clone()).encode().unwrap();
        let delivery = deliver(&broker, &consumer, body).await;

        assert_eq!(responder.handle(&consumer, delivery).await, QueryOutcome::Answered);
        assert_eq!(broker.pending(&config().query_topic), 0);

        let replies = Consumer::open(broker.clone(), &config().reply_topic).await.unwrap();
        let reply = replies.receive(Duration::ZERO).await.unwrap().unwrap();
        let reply = LocationReply::decode(&reply.body).unwrap();
        assert!(reply.answers(&name("report.csv"), &request_id));
        assert_eq!(reply.address, "p:1");
    }

    #[tokio::test]
    async fn leaves_query_for_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker();
        let store = store_with(dir.path(), &[]).await;
        let responder = LocationResponder::new(broker.clone(), store, "p:1", config());
        let consumer = Consumer::open(broker.clone(), &config().query_topic).await.unwrap();

        let body = LocationQuery::new(name("other"), RequestId::generate()).encode().unwrap();
        let delivery = deliver(&broker, &consumer, body).await;

        assert_eq!(responder.handle(&consumer, delivery).await, QueryOutcome::NotHeld);
        assert_eq!(broker.pending(&config().query_topic), 1);
        assert_eq!(broker.pending(&config().reply_topic), 0);
    }

    #[tokio::test]
    async fn drops_malformed_query() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker();
        let store = store_with(dir.path(), &[]).await;
        let responder = LocationResponder::new(broker.clone(), store, "p:1", config());
        let consumer = Consumer::open(broker.clone(), &config().query_topic).await.unwrap();

        let delivery = deliver(&broker, &consumer, "{not json".into()).await;
        assert_eq!(responder.handle(&consumer, delivery).await, QueryOutcome::Discarded);
        assert_eq!(broker.pending(&config().query_topic), 0);
    }

    #[tokio::test]
    async fn end_to_end_discovery_across_providers() {
        let broker = broker();
        let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
        let shutdown = CancellationToken::new();

        let mut tasks = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            let objects: &[&str] = if i == 2 { &["report.csv"] } else { &[] };
            let store = store_with(dir.path(), objects).await;
            let responder = LocationResponder::new(broker.clone(), store, format!("p{i}:1"), config());
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move { responder.run(shutdown).await }));
        }

        let requester = LocationRequester::new(broker.clone(), config());
        assert_eq!(requester.locate(&name("report.csv")).await.unwrap(), "p2:1");
        assert!(matches!(
            requester.locate(&name("nobody-has-it")).await,
            Err(ClusterError::NotFound(_))
        ));

        shutdown.cancel();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(broker.open_consumers(&config().query_topic), 0);
        assert_eq!(broker.open_consumers(&config().reply_topic), 0);
    }
}
