//! Named response stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::error::CacheResult;
use crate::response::{CachedResponse, ResponseHead};

/// Response store backend trait.
///
/// Implementations must make `put` atomic per key: a reader observes either
/// the previous response or the complete new one.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Store a response, replacing any previous entry for the key.
    async fn put(&self, key: &str, response: CachedResponse) -> CacheResult<()>;

    /// Look up the metadata of a stored response.
    async fn lookup(&self, key: &str) -> CacheResult<Option<ResponseHead>>;

    /// Read the body of a stored response.
    async fn read_body(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// List stored keys.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Remove every entry.
    async fn clear(&self) -> CacheResult<()>;

    /// Get a complete stored response.
    async fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        let Some(head) = self.lookup(key).await? else {
            return Ok(None);
        };
        Ok(self
            .read_body(key)
            .await?
            .map(|body| CachedResponse::from_parts(head, body)))
    }

    /// Check whether a key is stored.
    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.lookup(key).await?.is_some())
    }
}

/// In-memory response store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn put(&self, key: &str, response: CachedResponse) -> CacheResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn lookup(&self, key: &str) -> CacheResult<Option<ResponseHead>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(CachedResponse::head))
    }

    async fn read_body(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|response| response.body().to_vec()))
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// Factory creating the backend for a newly opened store.
pub type StoreFactory = dyn Fn(&str) -> CacheResult<Arc<dyn ResponseStore>> + Send + Sync;

/// Registry of named response stores.
///
/// Opening a name that does not exist creates it; deleting a name detaches
/// and empties the store, and the next `open` starts from a fresh one.
pub struct CacheStorage {
    stores: Mutex<HashMap<String, Arc<dyn ResponseStore>>>,
    factory: Box<StoreFactory>,
}

impl CacheStorage {
    /// Create a storage whose stores live in memory.
    pub fn in_memory() -> Self {
        Self::with_factory(|_| Ok(Arc::new(MemoryStore::new()) as Arc<dyn ResponseStore>))
    }

    /// Create a storage with a custom backend factory.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&str) -> CacheResult<Arc<dyn ResponseStore>> + Send + Sync + 'static,
    {
        Self {
            stores: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Open a named store, creating it if needed.
    pub fn open(&self, name: &str) -> CacheResult<Arc<dyn ResponseStore>> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let store = (self.factory)(name)?;
        stores.insert(name.to_string(), Arc::clone(&store));
        debug!(store = name, "opened response store");
        Ok(store)
    }

    /// Delete a named store and all its entries.
    ///
    /// Returns whether the store existed.
    pub async fn delete(&self, name: &str) -> CacheResult<bool> {
        let removed = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        match removed {
            Some(store) => {
                store.clear().await?;
                debug!(store = name, "deleted response store");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether a store with this name currently exists.
    pub fn contains(&self, name: &str) -> bool {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of the existing stores.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("stores", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn js(body: &str) -> CachedResponse {
        CachedResponse::new(body.as_bytes().to_vec(), HeaderValue::from_static("application/javascript"))
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let store = MemoryStore::new();
        store.put("/entries/a.js", js("one")).await.unwrap();
        store.put("/entries/a.js", js("two")).await.unwrap();

        let stored = store.get("/entries/a.js").await.unwrap().unwrap();
        assert_eq!(stored.body(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_and_read_body() {
        let store = MemoryStore::new();
        store.put("/k", js("abc")).await.unwrap();

        let head = store.lookup("/k").await.unwrap().unwrap();
        assert_eq!(head.content_length, 3);
        assert_eq!(store.read_body("/k").await.unwrap().unwrap(), b"abc");
        assert!(store.lookup("/missing").await.unwrap().is_none());
        assert!(!store.has("/missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_returns_same_store() {
        let storage = CacheStorage::in_memory();
        let a = storage.open("resources").unwrap();
        a.put("/k", js("v")).await.unwrap();

        let b = storage.open("resources").unwrap();
        assert!(b.has("/k").await.unwrap());
        assert_eq!(storage.names(), vec!["resources".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_empties_and_detaches() {
        let storage = CacheStorage::in_memory();
        let old = storage.open("resources").unwrap();
        old.put("/k", js("v")).await.unwrap();

        assert!(storage.delete("resources").await.unwrap());
        assert!(!storage.contains("resources"));
        assert!(!old.has("/k").await.unwrap());

        let fresh = storage.open("resources").unwrap();
        assert!(fresh.keys().await.unwrap().is_empty());
        assert!(!storage.delete("never-opened").await.unwrap());
    }

    #[tokio::test]
    async fn test_default_get_combines_head_and_body() {
        struct HeadOnly(MemoryStore);

        #[async_trait]
        impl ResponseStore for HeadOnly {
            async fn put(&self, key: &str, response: CachedResponse) -> CacheResult<()> {
                self.0.put(key, response).await
            }
            async fn lookup(&self, key: &str) -> CacheResult<Option<ResponseHead>> {
                self.0.lookup(key).await
            }
            async fn read_body(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
                self.0.read_body(key).await
            }
            async fn keys(&self) -> CacheResult<Vec<String>> {
                self.0.keys().await
            }
            async fn clear(&self) -> CacheResult<()> {
                self.0.clear().await
            }
        }

        let store = HeadOnly(MemoryStore::new());
        store.put("/k", js("body")).await.unwrap();
        assert_eq!(store.get("/k").await.unwrap().unwrap(), js("body"));
    }
}
