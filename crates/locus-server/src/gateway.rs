use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use tracing::info;

use locus_cluster::{LocationRequester, PlacementSelector, ProviderRegistry};
use locus_stream::{relay_put, GetStream, PutStream};
use locus_types::{ObjectName, ProviderRecord};

use crate::config::ReadPath;
use crate::error::{ServerError, ServerResult};

/// Shared state of the gateway's handlers.
#[derive(Clone, Debug)]
pub struct GatewayState {
    pub registry: Arc<ProviderRegistry>,
    pub selector: PlacementSelector,
    pub requester: LocationRequester,
    pub client: reqwest::Client,
    pub read_path: ReadPath,
}

impl GatewayState {
    pub fn new(registry: Arc<ProviderRegistry>, requester: LocationRequester, read_path: ReadPath) -> Self {
        Self {
            selector: PlacementSelector::new(registry.clone()),
            registry,
            requester,
            client: reqwest::Client::new(),
            read_path,
        }
    }

    async fn provider_for_read(&self, name: &ObjectName) -> ServerResult<String> {
        match self.read_path {
            ReadPath::Discover => Ok(self.requester.locate(name).await?),
            ReadPath::Direct => Ok(self.selector.select()?.address),
        }
    }
}

/// `GET /objects/{name}`: locate the holder and stream the object from it.
pub async fn get_object(State(state): State<GatewayState>, Path(name): Path<String>) -> ServerResult<Response> {
    let name = ObjectName::new(name)?;
    let address = state.provider_for_read(&name).await?;

    let upstream = GetStream::open(&state.client, &address, &name)
        .await
        .map_err(ServerError::upstream_read)?;
    state.registry.mark_seen(&address);
    let length = upstream.content_length();
    info!(object = %name, provider = %address, length = ?length, "relaying object to client");

    let mut response = Body::from_stream(upstream.into_stream()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

/// `PUT /objects/{name}`: place the object on a random provider.
///
/// Answers only after the provider has answered, so 200 means stored.
pub async fn put_object(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    body: Body,
) -> ServerResult<StatusCode> {
    let name = ObjectName::new(name)?;
    let provider = state.selector.select()?;

    let put = PutStream::open(&state.client, &provider.address, &name).map_err(ServerError::upstream_write)?;
    let written = relay_put(body.into_data_stream(), put)
        .await
        .map_err(ServerError::upstream_write)?;

    state.registry.mark_seen(&provider.address);
    info!(object = %name, provider = %provider.address, bytes = written, "object stored");
    Ok(StatusCode::OK)
}

/// `GET /providers`
pub async fn list_providers(State(state): State<GatewayState>) -> Json<Vec<ProviderRecord>> {
    Json(state.registry.snapshot())
}
