//! The connection context threaded through every store-facing call.
//!
//! A [`Connection`] owns a lazily-created backend handle and the live policy
//! [`Settings`]. Clones share both. [`Connection::isolated`] derives a context that
//! shares the backend but has its own settings with test mode turned on, so tests can
//! run against the disposable test database without flipping state for everyone else.
//!
//! # Example
//!
//! ```ignore
//! use docmap::{connection::Connection, memory::InMemoryStore};
//!
//! // Nothing is connected until the first store call.
//! let conn = Connection::lazy(InMemoryStore::builder());
//! let databases = conn.list_databases().await?;
//! ```

use std::sync::Arc;

use mea::rwlock::RwLock;
use tracing::{debug, info};

use crate::{
    backend::{Connector, Credentials, NewUser, StoreBackend, UserRole},
    config::{LiveSettings, Settings},
    error::{DocMapError, DocMapResult},
    path::{Namespace, Path},
    typecheck::AlertLevel,
};

/// Name of the database every path is redirected to in test mode.
pub const TEST_DATABASE_NAME: &str = "__DOCMAP_TEST_DATABASE__";

#[derive(Debug)]
struct BackendSlot {
    connector: Option<Arc<dyn Connector>>,
    backend: RwLock<Option<Arc<dyn StoreBackend>>>,
}

/// Shared handle to a document store plus the policies applied to it.
#[derive(Debug, Clone)]
pub struct Connection {
    slot: Arc<BackendSlot>,
    settings: Arc<LiveSettings>,
}

impl Connection {
    /// Wraps an already connected backend.
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            slot: Arc::new(BackendSlot {
                connector: None,
                backend: RwLock::new(Some(Arc::new(backend))),
            }),
            settings: Arc::new(LiveSettings::default()),
        }
    }

    /// Creates a connection that connects through `connector` on first use.
    pub fn lazy(connector: impl Connector + 'static) -> Self {
        Self {
            slot: Arc::new(BackendSlot {
                connector: Some(Arc::new(connector)),
                backend: RwLock::new(None),
            }),
            settings: Arc::new(LiveSettings::default()),
        }
    }

    /// Creates a connection and establishes it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::DatabaseUnavailable`] if the store cannot be reached.
    pub async fn connect(connector: impl Connector + 'static) -> DocMapResult<Self> {
        let connection = Self::lazy(connector);
        connection.backend().await?;

        Ok(connection)
    }

    /// Replaces the settings of this handle.
    ///
    /// The returned connection no longer shares settings with the clones of `self`.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(LiveSettings::new(settings));
        self
    }

    /// A context sharing this connection's backend, with test mode enabled.
    pub fn isolated(&self) -> Self {
        let mut settings = self.settings();
        settings.test_mode = true;

        Self {
            slot: self.slot.clone(),
            settings: Arc::new(LiveSettings::new(settings)),
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings.load()
    }

    pub fn set_defaults_handling(&self, level: AlertLevel) {
        self.settings.set_defaults_handling(level);
    }

    pub fn set_type_checking(&self, level: AlertLevel) {
        self.settings.set_type_checking(level);
    }

    pub fn set_test_mode(&self, enabled: bool) {
        self.settings.set_test_mode(enabled);
    }

    pub fn is_test_mode(&self) -> bool {
        self.settings.load().test_mode
    }

    /// Returns the backend, connecting first if this is the first use.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::DatabaseUnavailable`] if connecting fails or no backend
    /// was ever configured.
    pub async fn backend(&self) -> DocMapResult<Arc<dyn StoreBackend>> {
        if let Some(backend) = self.slot.backend.read().await.as_ref() {
            return Ok(backend.clone());
        }

        let mut guard = self.slot.backend.write().await;
        if let Some(backend) = guard.as_ref() {
            return Ok(backend.clone());
        }

        let backend = self.establish().await?;
        *guard = Some(backend.clone());

        Ok(backend)
    }

    /// Drops the current handle and connects again through the configured connector.
    ///
    /// Connections built with [`Connection::new`] have no connector and keep their backend.
    pub async fn reconnect(&self) -> DocMapResult<()> {
        if self.slot.connector.is_none() {
            return Ok(());
        }

        let backend = self.establish().await?;
        *self.slot.backend.write().await = Some(backend);

        Ok(())
    }

    async fn establish(&self) -> DocMapResult<Arc<dyn StoreBackend>> {
        let connector = self
            .slot
            .connector
            .as_ref()
            .ok_or_else(|| DocMapError::DatabaseUnavailable("no backend configured".to_string()))?;

        let backend = connector.connect().await.map_err(|err| match err {
            DocMapError::DatabaseUnavailable(_) => err,
            other => DocMapError::DatabaseUnavailable(other.to_string()),
        })?;
        info!(connector = ?connector, "connected to document store");

        Ok(backend)
    }

    /// Resolves a path to the namespace backends operate on.
    ///
    /// In test mode the database is replaced by [`TEST_DATABASE_NAME`] and the whole
    /// original path becomes the collection name.
    pub fn namespace(&self, path: &Path) -> Namespace {
        if self.is_test_mode() {
            Namespace::new(TEST_DATABASE_NAME, path.to_string())
        } else {
            Namespace::from(path)
        }
    }

    /// Authenticates with the store; `db: None` authenticates against the admin database.
    pub async fn authenticate(&self, username: &str, password: &str, db: Option<&str>) -> DocMapResult<()> {
        self.backend()
            .await?
            .authenticate(Credentials {
                username: username.to_string(),
                password: password.to_string(),
                database: db.map(str::to_string),
            })
            .await
    }

    /// Adds a user to `db` (or the admin database), read-only or read-write.
    pub async fn add_user(
        &self,
        name: &str,
        password: &str,
        read_only: bool,
        db: Option<&str>,
    ) -> DocMapResult<()> {
        self.backend()
            .await?
            .add_user(NewUser {
                name: name.to_string(),
                password: password.to_string(),
                role: if read_only { UserRole::Read } else { UserRole::ReadWrite },
                database: db.map(str::to_string),
            })
            .await
    }

    /// Adds a user with administrative access to every database.
    pub async fn add_superuser(&self, name: &str, password: &str) -> DocMapResult<()> {
        self.backend()
            .await?
            .add_user(NewUser {
                name: name.to_string(),
                password: password.to_string(),
                role: UserRole::Root,
                database: None,
            })
            .await
    }

    /// Lists all database names.
    pub async fn list_databases(&self) -> DocMapResult<Vec<String>> {
        self.backend().await?.list_databases().await
    }

    /// Lists the collection names of `database`.
    pub async fn list_collections(&self, database: &str) -> DocMapResult<Vec<String>> {
        self.backend().await?.list_collections(database).await
    }

    /// Deletes everything stored in the test database.
    pub async fn drop_test_database(&self) -> DocMapResult<()> {
        debug!(database = TEST_DATABASE_NAME, "dropping test database");
        self.backend().await?.drop_database(TEST_DATABASE_NAME).await
    }

    /// Shuts the backend down, if one was ever connected.
    pub async fn shutdown(&self) -> DocMapResult<()> {
        let backend = self.slot.backend.write().await.take();

        match backend {
            Some(backend) => backend.shutdown().await,
            None => Ok(()),
        }
    }
}
