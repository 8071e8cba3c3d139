use std::sync::Arc;

use storefront::gateway::HttpGatewayClient;
use storefront::store::SqliteStore;
use storefront::{Catalog, Coordinator, OrderStore, StorefrontError};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub coordinator: Arc<Coordinator<HttpGatewayClient>>,
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn Catalog>,
}

impl AppState {
    /// State backed by one SQLite store for both orders and catalog.
    pub fn new(config: ServerConfig, store: Arc<SqliteStore>) -> Result<Self, StorefrontError> {
        Self::with_stores(config, store.clone(), store)
    }

    pub fn with_stores(
        config: ServerConfig,
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, StorefrontError> {
        let gateway = HttpGatewayClient::new(config.gateway_config())?;
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&orders),
            Arc::clone(&catalog),
            gateway,
            config.coordinator_config(),
        ));
        Ok(Self {
            config: Arc::new(config),
            coordinator,
            orders,
            catalog,
        })
    }
}
