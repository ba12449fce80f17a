//! Server state
//!
//! Everything the HTTP layer and background tasks share. The correlation
//! store is constructed once here and handed to the registry and the
//! dispatcher; nothing reaches it through a global.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use tether_core::config::ServerConfig;
use tether_core::traits::ExchangeStore;
use tether_core::AbortReason;

use crate::dispatch::DispatchService;
use crate::exchange::InMemoryExchangeStore;
use crate::session::SessionRegistry;

/// Shared state for the server daemon
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Correlation store
    pub store: Arc<dyn ExchangeStore>,
    /// Session registry
    pub registry: Arc<SessionRegistry>,
    /// Dispatch service
    pub dispatch: Arc<DispatchService>,
    /// When the server started
    pub started_at: Instant,
    /// Fired by [`shutdown`](Self::shutdown); the dispatcher stops taking work
    stopping: CancellationToken,
}

impl ServerState {
    /// Create server state backed by the in-memory store
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryExchangeStore::new()))
    }

    /// Create server state around a provided store
    pub fn with_store(config: ServerConfig, store: Arc<dyn ExchangeStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let stopping = CancellationToken::new();
        let dispatch = Arc::new(DispatchService::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            stopping.clone(),
        ));

        Self {
            config,
            store,
            registry,
            dispatch,
            started_at: Instant::now(),
            stopping,
        }
    }

    /// Stop accepting commands and fail every pending exchange, so no
    /// operator request outlives the server.
    ///
    /// Returns the number of exchanges that were still pending.
    pub async fn shutdown(&self) -> usize {
        self.stopping.cancel();
        let drained = self.store.drain(AbortReason::ShuttingDown).await;
        if drained > 0 {
            tracing::info!("Drained {} pending exchanges", drained);
        }
        drained
    }
}
