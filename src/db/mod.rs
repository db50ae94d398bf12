//! Named connection pools.
//!
//! Entity services resolve their pool by connection name, so one process can
//! talk to several databases and services stay cheap value objects. Pools are
//! registered once (at startup or in test setup) and looked up per call.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Error, Result};

pub type Database = SqlitePool;

static POOLS: Lazy<RwLock<HashMap<String, Database>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Connection settings for [ConnectionManager::connect].
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// SQLite connection URL (e.g. `sqlite:data/app.db` or `sqlite::memory:`).
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Registry of named pools.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Open (or reuse) the pool registered under `name`.
    pub async fn connect(name: &str, config: ConnectConfig) -> Result<Database> {
        if name.is_empty() {
            return Err(Error::precondition("Connection name was not provided."));
        }

        if let Some(pool) = Self::get(name) {
            debug!(connection = name, "Delivering previously opened pool");
            return Ok(pool);
        }

        debug!(connection = name, url = %config.url, "Opening new pool");
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        POOLS.write().insert(name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Register an externally built pool under a name.
    pub fn register(name: &str, pool: Database) {
        POOLS.write().insert(name.to_string(), pool);
    }

    /// The open pool registered under `name`, if any.
    pub fn get(name: &str) -> Option<Database> {
        let pools = POOLS.read();
        match pools.get(name) {
            Some(pool) if !pool.is_closed() => Some(pool.clone()),
            _ => None,
        }
    }

    pub fn is_connected(name: &str) -> bool {
        Self::get(name).is_some()
    }

    /// Close and drop the pool registered under `name`. Closing an unknown
    /// name is a no-op.
    pub async fn close(name: &str) {
        let pool = POOLS.write().remove(name);
        if let Some(pool) = pool {
            debug!(connection = name, "Closing pool");
            pool.close().await;
        }
    }
}
