//! Connection-scoped service singletons.
//!
//! Service construction is not free (relation descriptors, sort templates),
//! and join composition repeatedly resolves the same related service, so
//! cores are cached per (service key, connection name) behind a mutex-guarded
//! map with get-or-create semantics.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::service::ServiceCore;

type Key = (&'static str, String);

static SERVICES: Lazy<Mutex<HashMap<Key, Arc<ServiceCore>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub struct ServiceRegistry;

impl ServiceRegistry {
    /// The core registered under `(key, connection)`, building and caching it
    /// on first use. The builder must not call back into the registry.
    pub fn get_or_create(
        key: &'static str,
        connection: &str,
        build: impl FnOnce() -> Result<ServiceCore>,
    ) -> Result<Arc<ServiceCore>> {
        if connection.is_empty() {
            return Err(Error::precondition("Connection name was not provided."));
        }

        let mut services = SERVICES.lock();
        if let Some(core) = services.get(&(key, connection.to_string())) {
            return Ok(core.clone());
        }

        let core = Arc::new(build()?);
        services.insert((key, connection.to_string()), core.clone());
        Ok(core)
    }

    /// Drop every cached core. Configuration-time only; never call with
    /// requests in flight.
    pub fn clear() {
        SERVICES.lock().clear();
    }
}
