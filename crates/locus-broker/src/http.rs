use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{BrokerError, BrokerResult};
use crate::traits::{validate_topic, ConsumerId, Delivery, MessageBroker, MessageId, ReceiptHandle};

/// Slack added to the HTTP timeout of a long-poll receive.
const RECEIVE_GRACE: Duration = Duration::from_secs(5);

/// Timeout for every other broker request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: MessageId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerResponse {
    consumer_id: ConsumerId,
}

/// Client for a broker node's HTTP API.
///
/// Endpoints, relative to the base URL:
///
/// | Method | Path | |
/// |--------|------|-|
/// | `POST` | `/topics/{topic}/messages` | publish (body is the message) |
/// | `GET` | `/topics/{topic}/messages?consumer=&waitMs=` | receive, 204 when empty |
/// | `DELETE` | `/topics/{topic}/messages/{receipt}` | acknowledge |
/// | `DELETE` | `/topics/{topic}/published/{message_id}` | withdraw |
/// | `POST` | `/topics/{topic}/consumers` | open consumer |
/// | `DELETE` | `/topics/{topic}/consumers/{id}` | close consumer, 404 if not open |
#[derive(Clone, Debug)]
pub struct HttpBroker {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBroker {
    /// `base_url` is e.g. `http://10.0.0.2:8040`; a bare `host:port` gets `http://`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url
        } else {
            format!("http://{base_url}")
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn topic_url(&self, topic: &str, rest: &str) -> BrokerResult<String> {
        validate_topic(topic)?;
        Ok(format!("{}/topics/{}/{}", self.base_url, topic, rest))
    }

    async fn expect_success(response: reqwest::Response) -> BrokerResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(BrokerError::Status { status: status.as_u16(), message })
    }

    fn consumer_closed(topic: &str, consumer: &ConsumerId) -> BrokerError {
        BrokerError::ConsumerClosed {
            topic: topic.to_string(),
            consumer: consumer.to_string(),
        }
    }
}

#[async_trait]
impl MessageBroker for HttpBroker {
    async fn publish(&self, topic: &str, body: String) -> BrokerResult<MessageId> {
        let url = self.topic_url(topic, "messages")?;
        let response = self.client.post(url).body(body).timeout(REQUEST_TIMEOUT).send().await?;
        let published: PublishResponse = Self::expect_success(response).await?.json().await?;
        Ok(published.message_id)
    }

    async fn open_consumer(&self, topic: &str) -> BrokerResult<ConsumerId> {
        let url = self.topic_url(topic, "consumers")?;
        let response = self.client.post(url).timeout(REQUEST_TIMEOUT).send().await?;
        let opened: ConsumerResponse = Self::expect_success(response).await?.json().await?;
        Ok(opened.consumer_id)
    }

    async fn close_consumer(&self, topic: &str, consumer: &ConsumerId) -> BrokerResult<()> {
        let url = self.topic_url(topic, &format!("consumers/{consumer}"))?;
        let response = self.client.delete(url).timeout(REQUEST_TIMEOUT).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Self::consumer_closed(topic, consumer));
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        consumer: &ConsumerId,
        wait: Duration,
    ) -> BrokerResult<Option<Delivery>> {
        let url = self.topic_url(topic, "messages")?;
        let wait_ms = wait.as_millis().to_string();
        let response = self
            .client
            .get(url)
            .query(&[("consumer", consumer.as_str()), ("waitMs", wait_ms.as_str())])
            .timeout(wait + RECEIVE_GRACE)
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::NOT_FOUND => Err(Self::consumer_closed(topic, consumer)),
            _ => {
                let delivery: Delivery = Self::expect_success(response).await?.json().await?;
                Ok(Some(delivery))
            }
        }
    }

    async fn acknowledge(&self, topic: &str, receipt: &ReceiptHandle) -> BrokerResult<()> {
        let url = self.topic_url(topic, &format!("messages/{receipt}"))?;
        let response = self.client.delete(url).timeout(REQUEST_TIMEOUT).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn withdraw(&self, topic: &str, message: &MessageId) -> BrokerResult<()> {
        let url = self.topic_url(topic, &format!("published/{message}"))?;
        let response = self.client.delete(url).timeout(REQUEST_TIMEOUT).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}
