//! Remote key-path record store.
//!
//! The back end is a JSON tree addressed by slash-separated paths
//! (Firebase Realtime Database semantics). Transports implement
//! [`RemoteStore`]; the engine talks to them through [`DeviceStore`], which
//! scopes paths to one device and bounds every call with a timeout.

#[cfg(feature = "http-store")]
mod http;
mod memory;

#[cfg(feature = "http-store")]
pub use http::HttpStore;
pub use memory::{MemoryStore, StoreCall};

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{RemoteConfig, RemoteTransport};
use crate::error::StoreError;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the document at `path`; `None` when nothing is stored there
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the document at `path`
    async fn put(&self, path: &str, doc: &Value) -> Result<(), StoreError>;

    /// Append `doc` under `path` with a generated, time-ordered key
    async fn post(&self, path: &str, doc: &Value) -> Result<String, StoreError>;

    /// Merge the top-level keys of `doc` into the document at `path`,
    /// creating it if absent. Keys not named in `doc` are left untouched.
    async fn patch(&self, path: &str, doc: &Value) -> Result<(), StoreError>;
}

/// Build the transport named by the configuration. `offline` forces the
/// in-memory store regardless of the configured transport.
pub fn open(config: &RemoteConfig, offline: bool) -> Result<Arc<dyn RemoteStore>, StoreError> {
    if offline || config.transport == RemoteTransport::Memory {
        debug!("Using in-memory remote store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "http-store")]
    {
        let store = HttpStore::new(config)?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "http-store"))]
    {
        Err(StoreError::NotConfigured)
    }
}

/// Paths under `<base>/<device>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: String,
}

impl StorePaths {
    pub fn new(base_path: &str, device_name: &str) -> Self {
        Self {
            root: format!("{}/{}", base_path.trim_matches('/'), device_name),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn info(&self) -> String {
        format!("{}/info", self.root)
    }

    pub fn current(&self) -> String {
        format!("{}/current", self.root)
    }

    pub fn history(&self) -> String {
        format!("{}/history", self.root)
    }

    pub fn alerts(&self) -> String {
        format!("{}/alerts", self.root)
    }

    pub fn thresholds(&self) -> String {
        format!("{}/info/thresholds", self.root)
    }

    pub fn assigned_parcel_id(&self) -> String {
        format!("{}/info/assignedParcelId", self.root)
    }

    pub fn last_seen(&self) -> String {
        format!("{}/info/lastSeen", self.root)
    }
}

/// Device-scoped store handle with a bounded timeout on every call
#[derive(Clone)]
pub struct DeviceStore {
    store: Arc<dyn RemoteStore>,
    paths: StorePaths,
    timeout: Duration,
}

impl DeviceStore {
    pub fn new(store: Arc<dyn RemoteStore>, paths: StorePaths, timeout: Duration) -> Self {
        Self {
            store,
            paths,
            timeout,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.bounded("GET", path, self.store.get(path)).await
    }

    pub async fn put(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.bounded("PUT", path, self.store.put(path, doc)).await
    }

    pub async fn post(&self, path: &str, doc: &Value) -> Result<String, StoreError> {
        self.bounded("POST", path, self.store.post(path, doc)).await
    }

    pub async fn patch(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.bounded("PATCH", path, self.store.patch(path, doc)).await
    }

    async fn bounded<T, F>(&self, method: &'static str, path: &str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        debug!("{} {}", method, path);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Remote call failed: {}", e);
                Err(e)
            }
            Err(_) => {
                let e = StoreError::Timeout {
                    method,
                    path: path.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!("Remote call failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Split a store path into non-empty segments
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StalledStore;

    #[async_trait]
    impl RemoteStore for StalledStore {
        async fn get(&self, _path: &str) -> Result<Option<Value>, StoreError> {
            std::future::pending().await
        }

        async fn put(&self, _path: &str, _doc: &Value) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn post(&self, _path: &str, _doc: &Value) -> Result<String, StoreError> {
            std::future::pending().await
        }

        async fn patch(&self, _path: &str, _doc: &Value) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_store_paths() {
        let paths = StorePaths::new("/SmartParcels/", "TRACEON_A1B2C3");
        assert_eq!(paths.root(), "SmartParcels/TRACEON_A1B2C3");
        assert_eq!(paths.info(), "SmartParcels/TRACEON_A1B2C3/info");
        assert_eq!(paths.thresholds(), "SmartParcels/TRACEON_A1B2C3/info/thresholds");
        assert_eq!(
            paths.assigned_parcel_id(),
            "SmartParcels/TRACEON_A1B2C3/info/assignedParcelId"
        );
        assert_eq!(paths.last_seen(), "SmartParcels/TRACEON_A1B2C3/info/lastSeen");
        assert_eq!(paths.alerts(), "SmartParcels/TRACEON_A1B2C3/alerts");
    }

    #[tokio::test]
    async fn test_calls_are_bounded_by_timeout() {
        let store = DeviceStore::new(
            Arc::new(StalledStore),
            StorePaths::new("SmartParcels", "TRACEON_000001"),
            Duration::from_millis(20),
        );

        let err = store.put("SmartParcels/x", &json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { method: "PUT", timeout_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_passes_through_store_results() {
        let memory = Arc::new(MemoryStore::new());
        let store = DeviceStore::new(
            memory.clone(),
            StorePaths::new("SmartParcels", "TRACEON_000001"),
            Duration::from_secs(1),
        );

        let path = store.paths().last_seen();
        store.put(&path, &json!("42")).await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), Some(json!("42")));
    }

    #[tokio::test]
    async fn test_offline_flag_selects_memory_store() {
        let config = crate::config::ParcelwatchConfig::default().remote;
        assert_eq!(config.transport, RemoteTransport::Http);

        let store = open(&config, true).unwrap();
        store.put("a/b", &json!(1)).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(json!(1)));
    }
}
