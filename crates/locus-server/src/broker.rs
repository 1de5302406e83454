use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use locus_broker::{ConsumerId, InMemoryBroker, MessageBroker, MessageId, ReceiptHandle};

use crate::error::ServerResult;

/// Longest long-poll a client may ask for.
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(20);

/// Shared state of a broker node's handlers.
#[derive(Clone)]
pub struct BrokerState {
    pub broker: Arc<InMemoryBroker>,
}

impl BrokerState {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self { broker }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveParams {
    pub consumer: String,
    #[serde(default)]
    pub wait_ms: u64,
}

/// `POST /topics/{topic}/consumers`
pub async fn open_consumer(State(state): State<BrokerState>, Path(topic): Path<String>) -> ServerResult<Response> {
    let id = state.broker.open_consumer(&topic).await?;
    Ok(Json(json!({ "consumerId": id })).into_response())
}

/// `DELETE /topics/{topic}/consumers/{id}`
pub async fn close_consumer(
    State(state): State<BrokerState>,
    Path((topic, id)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state.broker.close_consumer(&topic, &ConsumerId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /topics/{topic}/messages`, the body is the message.
pub async fn publish(
    State(state): State<BrokerState>,
    Path(topic): Path<String>,
    body: String,
) -> ServerResult<Response> {
    let id = state.broker.publish(&topic, body).await?;
    Ok(Json(json!({ "messageId": id })).into_response())
}

/// `GET /topics/{topic}/messages?consumer=..&waitMs=..`, 204 when nothing arrived.
pub async fn receive(
    State(state): State<BrokerState>,
    Path(topic): Path<String>,
    Query(params): Query<ReceiveParams>,
) -> ServerResult<Response> {
    let wait = Duration::from_millis(params.wait_ms).min(MAX_RECEIVE_WAIT);
    let consumer = ConsumerId::from(params.consumer);
    match state.broker.receive(&topic, &consumer, wait).await? {
        Some(delivery) => Ok(Json(delivery).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// `DELETE /topics/{topic}/messages/{receipt}`
pub async fn acknowledge(
    State(state): State<BrokerState>,
    Path((topic, receipt)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state.broker.acknowledge(&topic, &ReceiptHandle::from(receipt)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /topics/{topic}/published/{message_id}`
pub async fn withdraw(
    State(state): State<BrokerState>,
    Path((topic, message_id)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    state.broker.withdraw(&topic, &MessageId::from(message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
