//! Database connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;

use crate::StoreError;

/// Database connection handle. Cloning shares the underlying connection.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection mode: "mem://" or "rocksdb://path" (requires the rocksdb feature)
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "dispatch".to_string(),
            database: "mail".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Read `DISPATCH_DB_*` variables, falling back to in-memory storage.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("DISPATCH_DB_ENDPOINT") {
            Ok(endpoint) => Self {
                endpoint,
                ..Default::default()
            },
            Err(_) => Self::memory(),
        };
        if let Ok(namespace) = std::env::var("DISPATCH_DB_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Ok(database) = std::env::var("DISPATCH_DB_DATABASE") {
            config.database = database;
        }
        if let (Ok(username), Ok(password)) = (
            std::env::var("DISPATCH_DB_USER"),
            std::env::var("DISPATCH_DB_PASSWORD"),
        ) {
            config.credentials = Some((username, password));
        }
        config
    }
}

/// Open a connection and select the configured namespace and database.
///
/// Each call to a `mem://` endpoint yields an independent datastore.
pub async fn connect_db(config: &DbConfig) -> Result<Database, StoreError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect(config.endpoint.as_str()).await?;

    // Authenticate if credentials provided
    if let Some((username, password)) = &config.credentials {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
