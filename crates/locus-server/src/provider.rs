use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use locus_store::ProviderStore;
use locus_stream::{relay_to_writer, BRIDGE_BUFFER_SIZE};
use locus_types::ObjectName;

use crate::error::ServerResult;

/// Shared state of a storage provider's handlers.
#[derive(Clone)]
pub struct ProviderState {
    pub store: Arc<dyn ProviderStore>,
}

impl ProviderState {
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self { store }
    }
}

/// `GET /objects/{name}`
pub async fn get_object(State(state): State<ProviderState>, Path(name): Path<String>) -> ServerResult<Response> {
    let name = ObjectName::new(name)?;
    let reader = state.store.open_read(&name).await?;
    debug!(object = %name, "serving object");

    let mut response = Body::from_stream(ReaderStream::with_capacity(reader, BRIDGE_BUFFER_SIZE)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    Ok(response)
}

/// `PUT /objects/{name}`: create or replace the object.
///
/// A body that fails part way leaves whatever was written in place.
pub async fn put_object(
    State(state): State<ProviderState>,
    Path(name): Path<String>,
    body: Body,
) -> ServerResult<StatusCode> {
    let name = ObjectName::new(name)?;
    let mut writer = state.store.create_write(&name).await?;
    let written = relay_to_writer(body.into_data_stream(), &mut writer).await?;
    info!(object = %name, bytes = written, "object written");
    Ok(StatusCode::OK)
}
