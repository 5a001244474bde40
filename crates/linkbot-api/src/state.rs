//! Application state wiring the session registry to its adapters.
//!
//! The registry is generic over connector/store/processor traits; AppState
//! pins it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use linkbot_core::repository::CredentialStore;
use linkbot_core::session::{RegistryConfig, SessionRegistry};
use linkbot_infra::config::{credentials_key_path, load_config, resolve_data_dir};
use linkbot_infra::crypto::cipher::CredentialCipher;
use linkbot_infra::gateway::{GatewayConnector, GatewayInbox};
use linkbot_infra::memory::MemoryCredentialStore;
use linkbot_infra::processor::WebhookProcessor;
use linkbot_infra::sqlite::credential::SqliteCredentialStore;
use linkbot_infra::sqlite::pool::DatabasePool;
use linkbot_types::config::LinkbotConfig;
use linkbot_types::error::RepositoryError;
use linkbot_types::session::SessionId;
use linkbot_types::socket::Credentials;

/// Credential storage selected at startup.
pub enum CredentialBackend {
    Sqlite(SqliteCredentialStore),
    /// `--ephemeral`: nothing survives the process.
    Memory(MemoryCredentialStore),
}

impl CredentialStore for CredentialBackend {
    async fn load(&self, id: &SessionId) -> Result<Option<Credentials>, RepositoryError> {
        match self {
            CredentialBackend::Sqlite(store) => store.load(id).await,
            CredentialBackend::Memory(store) => store.load(id).await,
        }
    }

    async fn save(&self, id: &SessionId, credentials: &Credentials) -> Result<(), RepositoryError> {
        match self {
            CredentialBackend::Sqlite(store) => store.save(id, credentials).await,
            CredentialBackend::Memory(store) => store.save(id, credentials).await,
        }
    }

    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError> {
        match self {
            CredentialBackend::Sqlite(store) => store.delete(id).await,
            CredentialBackend::Memory(store) => store.delete(id).await,
        }
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, RepositoryError> {
        match self {
            CredentialBackend::Sqlite(store) => store.list_ids().await,
            CredentialBackend::Memory(store) => store.list_ids().await,
        }
    }
}

/// Concrete registry type pinned to infra implementations.
pub type ConcreteRegistry = SessionRegistry<GatewayConnector, CredentialBackend, WebhookProcessor>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConcreteRegistry,
    pub store: Arc<CredentialBackend>,
    pub inbox: Arc<GatewayInbox>,
    pub config: Arc<LinkbotConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, open storage, wire
    /// the registry.
    pub async fn init(ephemeral: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;

        let store = if ephemeral {
            tracing::info!("ephemeral mode: credentials are kept in memory only");
            CredentialBackend::Memory(MemoryCredentialStore::new())
        } else {
            let db_pool = DatabasePool::open(&data_dir).await?;
            // The key lives next to the database so every CLI invocation can
            // decrypt without prompting.
            let cipher = CredentialCipher::from_key_file(&credentials_key_path(&data_dir)).await?;
            CredentialBackend::Sqlite(SqliteCredentialStore::encrypted(db_pool, Arc::new(cipher)))
        };

        Self::from_parts(config, store, data_dir)
    }

    /// Wire the registry from an already loaded config and store.
    pub fn from_parts(
        config: LinkbotConfig,
        store: CredentialBackend,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let inbox = Arc::new(GatewayInbox::new());
        let connector = GatewayConnector::from_config(config.gateway.as_ref(), Arc::clone(&inbox))?;
        let processor = Arc::new(WebhookProcessor::from_config(config.processor.as_ref())?);
        let store = Arc::new(store);

        let registry = SessionRegistry::new(
            connector,
            Arc::clone(&store),
            processor,
            RegistryConfig::from(&config),
        );

        Ok(Self {
            registry,
            store,
            inbox,
            config: Arc::new(config),
            data_dir,
        })
    }
}
