use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use locus_broker::{HttpBroker, InMemoryBroker, MessageBroker};
use locus_cluster::{LocationRequester, LocationResponder, ProviderRegistry};
use locus_store::FsObjectStore;

use crate::broker::BrokerState;
use crate::config::{NodeConfig, NodeMode};
use crate::error::{ServerError, ServerResult};
use crate::gateway::GatewayState;
use crate::provider::ProviderState;
use crate::router::{broker_router, gateway_router, provider_router};

/// A Locus node: gateway, provider or broker, depending on its config.
pub struct LocusServer {
    config: NodeConfig,
    broker: Option<Arc<dyn MessageBroker>>,
    shutdown: CancellationToken,
}

impl LocusServer {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            broker: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `broker` instead of the one named in the config. Lets several
    /// nodes in one process share an in-process broker.
    pub fn with_broker(mut self, broker: Arc<dyn MessageBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Cancelling this token stops the node gracefully.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn message_broker(&self) -> Arc<dyn MessageBroker> {
        if let Some(broker) = &self.broker {
            return broker.clone();
        }
        match &self.config.broker {
            Some(url) => Arc::new(HttpBroker::new(url.clone())),
            None => {
                warn!("no broker configured, using an in-process broker");
                Arc::new(InMemoryBroker::new())
            }
        }
    }

    /// Bind the configured listen address and serve until shutdown.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        self.config.validate()?;
        let local_addr = listener.local_addr()?;
        let mut responder = None;

        let app: Router = match self.config.mode {
            NodeMode::Gateway => {
                let registry = Arc::new(ProviderRegistry::from_addresses(self.config.peers.iter().cloned()));
                if registry.is_empty() {
                    warn!("gateway has no providers, writes will fail");
                }
                let requester = LocationRequester::new(self.message_broker(), self.config.locate_config());
                gateway_router(GatewayState::new(registry, requester, self.config.read_path))
            }
            NodeMode::Provider => {
                let store = Arc::new(FsObjectStore::open(&self.config.storage_root).await?);
                let address = self
                    .config
                    .advertise_addr
                    .clone()
                    .unwrap_or_else(|| local_addr.to_string());
                let task = LocationResponder::new(self.message_broker(), store.clone(), address, self.config.locate_config());
                let shutdown = self.shutdown.child_token();
                responder = Some(tokio::spawn(async move {
                    if let Err(e) = task.run(shutdown).await {
                        error!(error = %e, "location responder failed");
                    }
                }));
                provider_router(ProviderState::new(store))
            }
            NodeMode::Broker => {
                if self.config.broker.is_some() {
                    warn!("broker nodes serve their own queues, ignoring the configured broker URL");
                }
                broker_router(BrokerState::new(Arc::new(InMemoryBroker::new())))
            }
        };

        info!(mode = %self.config.mode, addr = %local_addr, "Locus node listening");
        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        self.shutdown.cancel();
        if let Some(responder) = responder {
            if let Err(e) = responder.await {
                warn!(error = %e, "location responder panicked");
            }
        }
        info!(mode = %self.config.mode, "Locus node stopped");
        served
    }
}
