//! KvStore trait and typed helpers

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::KvError;

/// Async get/set capability keyed by string
///
/// A missing key is not an error: `get` returns `Ok(None)` for values that
/// were never written.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: Value) -> Result<(), KvError>;
}

/// Typed access on top of any [`KvStore`]
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Read and deserialize the value stored under `key`
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>, KvError>
    where
        T: DeserializeOwned + Send,
    {
        debug!(%key, "get_as: called");
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => {
                debug!(%key, "get_as: key absent");
                Ok(None)
            }
        }
    }

    /// Serialize `value` and store it under `key`
    async fn set_as<T>(&self, key: &str, value: &T) -> Result<(), KvError>
    where
        T: Serialize + Sync + ?Sized,
    {
        debug!(%key, "set_as: called");
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        theme: String,
        columns: u32,
    }

    #[tokio::test]
    async fn test_typed_roundtrip_through_dyn_store() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let settings = Settings {
            theme: "dark".to_string(),
            columns: 3,
        };

        store.set_as("settings", &settings).await.unwrap();
        let loaded: Option<Settings> = store.get_as("settings").await.unwrap();
        assert_eq!(loaded, Some(settings));
    }

    #[tokio::test]
    async fn test_get_as_missing_key() {
        let store = MemoryStore::new();
        let loaded: Option<Settings> = store.get_as("nothing-here").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_get_as_shape_mismatch_is_json_error() {
        let store = MemoryStore::new();
        store.set("settings", serde_json::json!(["not", "an", "object"])).await.unwrap();

        let result: Result<Option<Settings>, KvError> = store.get_as("settings").await;
        assert!(matches!(result, Err(KvError::Json(_))));
    }
}
