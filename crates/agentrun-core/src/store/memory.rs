use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use agentrun_model::ObjectMeta;

use crate::clock::{Clock, SystemClock};
use crate::store::{ObjectKey, Store, StoreError, WatchEvent, WatchOp};

const WATCH_CAPACITY: usize = 1024;

type Slot = (String, ObjectKey);

/// In-process [`Store`] used by tests and the demo daemon.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
    events: broadcast::Sender<WatchEvent>,
    clock: Arc<dyn Clock>,
}

struct MemoryStoreInner {
    objects: HashMap<Slot, Value>,
    last_version: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` for creation timestamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(MemoryStoreInner {
                objects: HashMap::new(),
                last_version: 0,
            })),
            events,
            clock,
        }
    }

    /// Number of stored objects of `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.read()
            .map(|inner| inner.objects.keys().filter(|(k, _)| k == kind).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn notify(&self, kind: &str, meta: &ObjectMeta, op: WatchOp) {
        // No receivers is fine.
        let _ = self.events.send(WatchEvent {
            kind: kind.to_string(),
            key: ObjectKey::new(&meta.namespace, &meta.name),
            op,
            owners: meta.owner_references.clone(),
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn meta_of(object: &Value) -> Result<ObjectMeta, StoreError> {
    let meta = object
        .get("metadata")
        .cloned()
        .ok_or_else(|| StoreError::Serialization("object has no metadata".into()))?;
    Ok(serde_json::from_value(meta)?)
}

fn set_meta(object: &mut Value, meta: &ObjectMeta) -> Result<(), StoreError> {
    let slot = object
        .get_mut("metadata")
        .ok_or_else(|| StoreError::Serialization("object has no metadata".into()))?;
    *slot = serde_json::to_value(meta)?;
    Ok(())
}

fn describe(kind: &str, key: &ObjectKey) -> String {
    format!("{kind} {key}")
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let inner = self.read()?;
        Ok(inner.objects.get(&(kind.to_string(), key.clone())).cloned())
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let inner = self.read()?;
        let mut items: Vec<(&ObjectKey, &Value)> = inner
            .objects
            .iter()
            .filter(|((k, key), _)| k == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .map(|((_, key), v)| (key, v))
            .collect();
        items.sort_by(|a, b| a.0.cmp(b.0));
        Ok(items.into_iter().map(|(_, v)| v.clone()).collect())
    }

    async fn create(&self, kind: &str, mut object: Value) -> Result<Value, StoreError> {
        let mut meta = meta_of(&object)?;
        if meta.name.is_empty() {
            return Err(StoreError::Serialization("metadata.name is empty".into()));
        }
        let key = ObjectKey::new(&meta.namespace, &meta.name);
        let slot = (kind.to_string(), key.clone());

        {
            let mut inner = self.write()?;
            if inner.objects.contains_key(&slot) {
                return Err(StoreError::AlreadyExists(describe(kind, &key)));
            }
            inner.last_version += 1;
            meta.resource_version = Some(inner.last_version);
            if meta.uid.is_empty() {
                meta.uid = uuid::Uuid::new_v4().to_string();
            }
            if meta.creation_timestamp.is_none() {
                meta.creation_timestamp = Some(self.clock.now());
            }
            set_meta(&mut object, &meta)?;
            inner.objects.insert(slot, object.clone());
        }

        trace!(kind, %key, "object created");
        self.notify(kind, &meta, WatchOp::Applied);
        Ok(object)
    }

    async fn replace(&self, kind: &str, mut object: Value) -> Result<Value, StoreError> {
        let mut meta = meta_of(&object)?;
        let key = ObjectKey::new(&meta.namespace, &meta.name);
        let slot = (kind.to_string(), key.clone());

        {
            let mut inner = self.write()?;
            let stored = inner
                .objects
                .get(&slot)
                .ok_or_else(|| StoreError::NotFound(describe(kind, &key)))?;
            let stored_meta = meta_of(stored)?;
            if stored_meta.resource_version != meta.resource_version {
                return Err(StoreError::Conflict(describe(kind, &key)));
            }

            inner.last_version += 1;
            meta.resource_version = Some(inner.last_version);
            meta.uid = stored_meta.uid;
            meta.creation_timestamp = stored_meta.creation_timestamp;
            set_meta(&mut object, &meta)?;
            inner.objects.insert(slot, object.clone());
        }

        trace!(kind, %key, version = ?meta.resource_version, "object replaced");
        self.notify(kind, &meta, WatchOp::Applied);
        Ok(object)
    }

    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        let removed = {
            let mut inner = self.write()?;
            let root = inner
                .objects
                .remove(&(kind.to_string(), key.clone()))
                .ok_or_else(|| StoreError::NotFound(describe(kind, key)))?;

            let mut removed = vec![(kind.to_string(), meta_of(&root)?)];
            let mut cursor = 0;
            while cursor < removed.len() {
                let owner_uid = removed[cursor].1.uid.clone();
                cursor += 1;

                let children: Vec<Slot> = inner
                    .objects
                    .iter()
                    .filter(|(_, v)| meta_of(v).is_ok_and(|m| m.is_owned_by(&owner_uid)))
                    .map(|(slot, _)| slot.clone())
                    .collect();

                for slot in children {
                    if let Some(child) = inner.objects.remove(&slot) {
                        removed.push((slot.0, meta_of(&child)?));
                    }
                }
            }
            removed
        };

        debug!(kind, %key, cascaded = removed.len() - 1, "object deleted");
        for (kind, meta) in &removed {
            self.notify(kind, meta, WatchOp::Deleted);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
