use std::{marker::PhantomData, sync::Arc};

use tracing::{debug, warn};

use agentrun_model::Resource;

use crate::store::{ObjectKey, Store, StoreError};

/// Typed, namespaced view over a [`Store`].
pub struct Api<R> {
    store: Arc<dyn Store>,
    namespace: String,
    _kind: PhantomData<fn() -> R>,
}

impl<R> Clone for Api<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<R: Resource> Api<R> {
    pub fn namespaced(store: Arc<dyn Store>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, name: &str) -> ObjectKey {
        ObjectKey::new(&self.namespace, name)
    }

    pub async fn get_opt(&self, name: &str) -> Result<Option<R>, StoreError> {
        match self.store.get(R::KIND, &self.key(name)).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, name: &str) -> Result<R, StoreError> {
        self.get_opt(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", R::KIND, self.key(name))))
    }

    pub async fn list(&self) -> Result<Vec<R>, StoreError> {
        self.store
            .list(R::KIND, Some(&self.namespace))
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    /// Objects in this namespace whose owner references include `uid`.
    pub async fn list_owned_by(&self, uid: &str) -> Result<Vec<R>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.meta().is_owned_by(uid))
            .collect())
    }

    pub async fn create(&self, object: &R) -> Result<R, StoreError> {
        let mut object = object.clone();
        object.meta_mut().namespace = self.namespace.clone();
        let created = self
            .store
            .create(R::KIND, serde_json::to_value(&object)?)
            .await?;
        Ok(serde_json::from_value(created)?)
    }

    /// Create `object`, treating an existing object of the same name as success.
    ///
    /// Returns the stored object and whether this call created it.
    pub async fn ensure(&self, object: &R) -> Result<(R, bool), StoreError> {
        match self.create(object).await {
            Ok(created) => Ok((created, true)),
            Err(e) if e.is_already_exists() => {
                debug!(kind = R::KIND, name = object.name(), "object already exists");
                Ok((self.get(object.name()).await?, false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn replace(&self, object: &R) -> Result<R, StoreError> {
        let replaced = self
            .store
            .replace(R::KIND, serde_json::to_value(object)?)
            .await?;
        Ok(serde_json::from_value(replaced)?)
    }

    /// Read-modify-write of a single object.
    ///
    /// `mutate` is applied to a fresh copy on every attempt; a conflict triggers a re-read,
    /// up to `retries` extra attempts. A mutation that changes nothing is not written.
    pub async fn update_with<F>(&self, name: &str, retries: usize, mut mutate: F) -> Result<R, StoreError>
    where
        F: FnMut(&mut R) + Send,
    {
        let mut attempt = 0;
        loop {
            let current = self.get(name).await?;
            let mut object = current.clone();
            mutate(&mut object);
            if serde_json::to_value(&object)? == serde_json::to_value(&current)? {
                return Ok(current);
            }
            match self.replace(&object).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::Conflict(what)) if attempt < retries => {
                    attempt += 1;
                    warn!(kind = R::KIND, %what, attempt, "conflict on update; re-reading");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns `false` if the object was already gone.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        match self.store.delete(R::KIND, &self.key(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use agentrun_model::{ConfigMap, ObjectMeta};

    fn api() -> (MemoryStore, Api<ConfigMap>) {
        let store = MemoryStore::new();
        let api = Api::namespaced(Arc::new(store.clone()) as Arc<dyn Store>, "ns");
        (store, api)
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let (store, api) = api();
        let cm = ConfigMap::new(ObjectMeta::new("ns", "a")).with_entry("k", "v1");

        let (first, created) = api.ensure(&cm).await.unwrap();
        assert!(created);

        let other = ConfigMap::new(ObjectMeta::new("ns", "a")).with_entry("k", "v2");
        let (second, created) = api.ensure(&other).await.unwrap();
        assert!(!created);
        assert_eq!(second.metadata.uid, first.metadata.uid);
        assert_eq!(second.data["k"], "v1");
        assert_eq!(store.count("ConfigMap"), 1);
    }

    /// Rejects the first `conflicts` replaces as stale.
    struct ContendedStore {
        inner: MemoryStore,
        conflicts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Store for ContendedStore {
        async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<serde_json::Value>, StoreError> {
            self.inner.get(kind, key).await
        }
        async fn list(&self, kind: &str, ns: Option<&str>) -> Result<Vec<serde_json::Value>, StoreError> {
            self.inner.list(kind, ns).await
        }
        async fn create(&self, kind: &str, object: serde_json::Value) -> Result<serde_json::Value, StoreError> {
            self.inner.create(kind, object).await
        }
        async fn replace(&self, kind: &str, object: serde_json::Value) -> Result<serde_json::Value, StoreError> {
            use std::sync::atomic::Ordering;
            if self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict(kind.to_string()));
            }
            self.inner.replace(kind, object).await
        }
        async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
            self.inner.delete(kind, key).await
        }
        fn watch(&self) -> tokio::sync::broadcast::Receiver<crate::store::WatchEvent> {
            self.inner.watch()
        }
    }

    fn contended(conflicts: usize) -> Api<ConfigMap> {
        let store = ContendedStore {
            inner: MemoryStore::new(),
            conflicts: std::sync::atomic::AtomicUsize::new(conflicts),
        };
        Api::namespaced(Arc::new(store) as Arc<dyn Store>, "ns")
    }

    #[tokio::test]
    async fn update_with_rereads_after_conflict() {
        let api = contended(2);
        api.create(&ConfigMap::new(ObjectMeta::new("ns", "a")))
            .await
            .unwrap();

        let mut calls = 0;
        let updated = api
            .update_with("a", 3, |cm| {
                calls += 1;
                cm.data.insert("k".into(), "v".into());
            })
            .await
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(updated.data["k"], "v");
    }

    #[tokio::test]
    async fn update_with_gives_up_after_retries() {
        let api = contended(5);
        api.create(&ConfigMap::new(ObjectMeta::new("ns", "a")))
            .await
            .unwrap();

        let err = api
            .update_with("a", 1, |cm| {
                cm.data.insert("k".into(), "v".into());
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_with_skips_noop_writes() {
        let (_store, api) = api();
        let created = api
            .create(&ConfigMap::new(ObjectMeta::new("ns", "a")))
            .await
            .unwrap();

        let same = api.update_with("a", 0, |_| {}).await.unwrap();
        assert_eq!(same.metadata.resource_version, created.metadata.resource_version);
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        let (_store, api) = api();
        assert!(!api.delete("ghost").await.unwrap());
    }
}
