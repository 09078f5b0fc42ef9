use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

use super::{is_valid_identifier, MemoryStore, PgDocumentStore, StoreError, StoreHandle};

/// How tenant handles are constructed
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// One PostgreSQL database per tenant on the server named by `database_url`
    Postgres {
        database_url: String,
        max_connections: u32,
        connect_timeout: Duration,
    },
    /// In-process maps, one per tenant
    Memory,
}

/// Tenant handle cache. Entries are created lazily on first use and never evicted.
pub struct StoreManager {
    backend: StoreBackend,
    handles: Arc<RwLock<HashMap<String, StoreHandle>>>,
    // System database handle for health pings, never shared with tenants
    health: OnceCell<StoreHandle>,
}

impl StoreManager {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            handles: Arc::new(RwLock::new(HashMap::new())),
            health: OnceCell::new(),
        }
    }

    pub fn memory() -> Self {
        Self::new(StoreBackend::Memory)
    }

    /// Get the tenant's store handle, creating it if absent
    pub async fn tenant(&self, tenant: &str) -> Result<StoreHandle, StoreError> {
        if !is_valid_identifier(tenant) {
            return Err(StoreError::InvalidName(tenant.to_string()));
        }

        // Fast path: try read lock
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(tenant) {
                return Ok(handle.clone());
            }
        }

        let handle = self.connect(tenant).await?;

        // Concurrent first requests may both connect; the last insert wins and
        // both handles point at the same tenant database.
        {
            let mut handles = self.handles.write().await;
            handles.insert(tenant.to_string(), handle.clone());
        }

        info!("Created store handle for tenant: {}", tenant);
        Ok(handle)
    }

    async fn connect(&self, tenant: &str) -> Result<StoreHandle, StoreError> {
        match &self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Postgres {
                database_url,
                max_connections,
                connect_timeout,
            } => {
                let connection_string = Self::build_connection_string(database_url, tenant)?;
                let pool = PgPoolOptions::new()
                    .max_connections(*max_connections)
                    .acquire_timeout(*connect_timeout)
                    .connect(&connection_string)
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))?;
                Ok(Arc::new(PgDocumentStore::new(pool)))
            }
        }
    }

    /// Swap the database name in the base URL path for the tenant's
    fn build_connection_string(base: &str, database_name: &str) -> Result<String, StoreError> {
        let mut url = url::Url::parse(base).map_err(|_| StoreError::InvalidDatabaseUrl)?;
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Name of the database the base URL points at, used for health checks
    fn system_database(base: &str) -> Result<String, StoreError> {
        let url = url::Url::parse(base).map_err(|_| StoreError::InvalidDatabaseUrl)?;
        let name = url.path().trim_start_matches('/');
        if name.is_empty() {
            Ok("postgres".to_string())
        } else {
            Ok(name.to_string())
        }
    }

    /// Pings the backend to ensure connectivity
    pub async fn health_check(&self) -> Result<(), StoreError> {
        match &self.backend {
            StoreBackend::Memory => Ok(()),
            StoreBackend::Postgres { database_url, .. } => {
                let system = Self::system_database(database_url)?;
                let handle = self.health.get_or_try_init(|| self.connect(&system)).await?;
                handle.ping().await
            }
        }
    }

    /// Number of cached tenant handles
    pub async fn cached_tenants(&self) -> usize {
        self.handles.read().await.len()
    }
}
