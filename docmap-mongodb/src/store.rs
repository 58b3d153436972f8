use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, Credential, FindOptions, ServerAddress},
};
use tracing::{debug, info};

use docmap_core::{
    backend::{Credentials, NewUser, StoreBackend, StoreBackendBuilder, UserRole},
    error::{DocMapError, DocMapResult},
    path::Namespace,
    query::FindQuery,
};

/// Connection string used when none is given.
pub const DEFAULT_DSN: &str = "mongodb://localhost:27017";

/// Server error code of a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

const ADMIN_DATABASE: &str = "admin";

fn map_error(err: MongoError) -> DocMapError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY_CODE,
        _ => false,
    };

    if duplicate {
        DocMapError::DatabaseConflict(err.to_string())
    } else {
        DocMapError::Backend(err.to_string())
    }
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: RwLock<Client>,
    options: ClientOptions,
}

impl MongoDbStore {
    pub fn new(client: Client, options: ClientOptions) -> Self {
        Self {
            client: RwLock::new(client),
            options,
        }
    }

    pub fn builder(dsn: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn)
    }

    async fn get_collection(&self, ns: &Namespace) -> MongoCollection<Document> {
        self.client
            .read()
            .await
            .database(&ns.database)
            .collection(&ns.collection)
    }
}

async fn ping(client: &Client, database: &str) -> Result<(), MongoError> {
    client.database(database).run_command(doc! { "ping": 1 }).await?;

    Ok(())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_one(&self, ns: &Namespace, filter: Document) -> DocMapResult<Option<Document>> {
        self.get_collection(ns)
            .await
            .find_one(filter)
            .await
            .map_err(map_error)
    }

    async fn find(&self, ns: &Namespace, query: FindQuery) -> DocMapResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.skip {
            options.skip = Some(skip);
        }
        options.sort = query.sort_document();
        options.projection = query.projection.as_ref().map(|p| p.to_document());

        let records = self
            .get_collection(ns)
            .await
            .find(query.filter)
            .with_options(options)
            .await
            .map_err(map_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(map_error)?;
        debug!(namespace = %ns, records = records.len(), "mongodb find");

        Ok(records)
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64> {
        self.get_collection(ns)
            .await
            .count_documents(filter)
            .await
            .map_err(map_error)
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> DocMapResult<Bson> {
        Ok(self
            .get_collection(ns)
            .await
            .insert_one(document)
            .await
            .map_err(map_error)?
            .inserted_id)
    }

    async fn replace_one(
        &self,
        ns: &Namespace,
        filter: Document,
        document: Document,
        upsert: bool,
    ) -> DocMapResult<()> {
        self.get_collection(ns)
            .await
            .replace_one(filter, document)
            .upsert(upsert)
            .await
            .map_err(map_error)?;

        Ok(())
    }

    async fn update_one(&self, ns: &Namespace, filter: Document, update: Document) -> DocMapResult<()> {
        self.get_collection(ns)
            .await
            .update_one(filter, update)
            .await
            .map_err(map_error)?;

        Ok(())
    }

    async fn remove(&self, ns: &Namespace, filter: Document) -> DocMapResult<u64> {
        Ok(self
            .get_collection(ns)
            .await
            .delete_many(filter)
            .await
            .map_err(map_error)?
            .deleted_count)
    }

    async fn list_databases(&self) -> DocMapResult<Vec<String>> {
        self.client
            .read()
            .await
            .list_database_names()
            .await
            .map_err(map_error)
    }

    async fn list_collections(&self, database: &str) -> DocMapResult<Vec<String>> {
        self.client
            .read()
            .await
            .database(database)
            .list_collection_names()
            .await
            .map_err(map_error)
    }

    async fn drop_database(&self, database: &str) -> DocMapResult<()> {
        self.client
            .read()
            .await
            .database(database)
            .drop()
            .await
            .map_err(map_error)
    }

    async fn authenticate(&self, credentials: Credentials) -> DocMapResult<()> {
        let source = credentials
            .database
            .clone()
            .unwrap_or_else(|| ADMIN_DATABASE.to_string());

        let mut options = self.options.clone();
        options.credential = Some(
            Credential::builder()
                .username(credentials.username.clone())
                .password(credentials.password)
                .source(source.clone())
                .build(),
        );

        let client = Client::with_options(options).map_err(map_error)?;
        ping(&client, &source)
            .await
            .map_err(|e| DocMapError::Authentication(e.to_string()))?;

        let previous = std::mem::replace(&mut *self.client.write().await, client);
        previous.shutdown().await;
        info!(user = %credentials.username, database = %source, "authenticated with mongodb");

        Ok(())
    }

    async fn add_user(&self, user: NewUser) -> DocMapResult<()> {
        let database = user.database.unwrap_or_else(|| ADMIN_DATABASE.to_string());
        let role = match user.role {
            UserRole::Read => doc! { "role": "read", "db": database.clone() },
            UserRole::ReadWrite => doc! { "role": "readWrite", "db": database.clone() },
            UserRole::Root => doc! { "role": "root", "db": ADMIN_DATABASE },
        };

        self.client
            .read()
            .await
            .database(&database)
            .run_command(doc! {
                "createUser": user.name,
                "pwd": user.password,
                "roles": [role],
            })
            .await
            .map_err(map_error)?;

        Ok(())
    }

    async fn shutdown(&self) -> DocMapResult<()> {
        self.client.read().await.clone().shutdown().await;

        Ok(())
    }
}

/// Builder for [`MongoDbStore`].
///
/// Building verifies that the server is reachable.
///
/// # Example
///
/// ```ignore
/// use docmap::{connection::Connection, mongodb::MongoDbStoreBuilder};
/// use std::time::Duration;
///
/// let conn = Connection::lazy(
///     MongoDbStoreBuilder::default()
///         .host("db.internal")
///         .port(27018)
///         .server_selection_timeout(Duration::from_secs(2)),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    host: Option<String>,
    port: Option<u16>,
    app_name: Option<String>,
    server_selection_timeout: Option<Duration>,
}

impl Default for MongoDbStoreBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DSN)
    }
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            host: None,
            port: None,
            app_name: None,
            server_selection_timeout: None,
        }
    }

    /// Overrides the hosts of the connection string with a single host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    async fn options(&self) -> DocMapResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocMapError::DatabaseUnavailable(e.to_string()))?;

        if self.host.is_some() || self.port.is_some() {
            let host = match (&self.host, options.hosts.first()) {
                (Some(host), _) => host.clone(),
                (None, Some(ServerAddress::Tcp { host, .. })) => host.clone(),
                (None, _) => "localhost".to_string(),
            };
            options.hosts = vec![ServerAddress::Tcp { host, port: self.port }];
        }
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        Ok(options)
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocMapResult<Self::Backend> {
        let options = self.options().await?;
        let client = Client::with_options(options.clone())
            .map_err(|e| DocMapError::DatabaseUnavailable(e.to_string()))?;

        ping(&client, ADMIN_DATABASE)
            .await
            .map_err(|e| DocMapError::DatabaseUnavailable(e.to_string()))?;
        info!(hosts = ?options.hosts, "connected to mongodb");

        Ok(MongoDbStore::new(client, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_and_port_override_the_connection_string() {
        let options = MongoDbStoreBuilder::default()
            .host("db.internal")
            .port(27018)
            .app_name("docmap-tests")
            .server_selection_timeout(Duration::from_millis(250))
            .options()
            .await
            .unwrap();

        assert_eq!(
            options.hosts,
            vec![ServerAddress::Tcp { host: "db.internal".to_string(), port: Some(27018) }]
        );
        assert_eq!(options.app_name.as_deref(), Some("docmap-tests"));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn malformed_connection_strings_are_unavailable() {
        let result = MongoDbStoreBuilder::new("not-a-uri").options().await;
        assert!(matches!(result, Err(DocMapError::DatabaseUnavailable(_))));
    }
}
