use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::broker::{self, BrokerState};
use crate::gateway::{self, GatewayState};
use crate::handler;
use crate::provider::{self, ProviderState};

/// Gateway endpoints: object relay plus the provider listing.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(handler::index_handler))
        .route("/providers", get(gateway::list_providers))
        .route(
            "/objects/:name",
            get(gateway::get_object).put(gateway::put_object),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Storage provider endpoints.
pub fn provider_router(state: ProviderState) -> Router {
    Router::new()
        .route("/", get(handler::index_handler))
        .route(
            "/objects/:name",
            get(provider::get_object).put(provider::put_object),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Broker node endpoints, as consumed by `locus_broker::HttpBroker`.
pub fn broker_router(state: BrokerState) -> Router {
    Router::new()
        .route("/", get(handler::index_handler))
        .route("/topics/:topic/consumers", post(broker::open_consumer))
        .route("/topics/:topic/consumers/:id", delete(broker::close_consumer))
        .route(
            "/topics/:topic/messages",
            post(broker::publish).get(broker::receive),
        )
        .route("/topics/:topic/messages/:receipt", delete(broker::acknowledge))
        .route("/topics/:topic/published/:message_id", delete(broker::withdraw))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
