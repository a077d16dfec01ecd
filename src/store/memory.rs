//! In-memory record store with watch streams

use super::{Record, StoreEvent};
use crate::error::Error;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const WATCH_CAPACITY: usize = 1024;

struct Bucket<R: Record> {
    data: RwLock<HashMap<String, R>>,
    tx: broadcast::Sender<StoreEvent<R>>,
}

impl<R: Record> Bucket<R> {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            data: RwLock::new(HashMap::new()),
            tx,
        }
    }

    fn notify(&self, event: StoreEvent<R>) {
        // No receivers is fine; watchers come and go
        let _ = self.tx.send(event);
    }
}

type Cascader = Arc<dyn Fn(&MemoryStore, Uuid) + Send + Sync>;

#[derive(Default)]
struct Inner {
    buckets: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    cascaders: Vec<Cascader>,
}

/// Shared in-memory record store. Writes are optimistic: an update must
/// carry the generation it read, otherwise it fails with a conflict and
/// the writer is expected to re-read and re-reconcile.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bucket<R: Record>(&self) -> Arc<Bucket<R>> {
        let key = TypeId::of::<R>();
        if let Some(bucket) = self.inner.read().buckets.get(&key) {
            return bucket.clone().downcast::<Bucket<R>>().ok().expect("bucket type");
        }
        let mut inner = self.inner.write();
        // Raced with another creator between the locks
        if let Some(bucket) = inner.buckets.get(&key) {
            return bucket.clone().downcast::<Bucket<R>>().ok().expect("bucket type");
        }
        let bucket = Arc::new(Bucket::<R>::new());
        inner.buckets.insert(key, bucket.clone());
        inner
            .cascaders
            .push(Arc::new(|store, owner_uid| store.delete_owned::<R>(owner_uid)));
        bucket
    }

    /// Create a record; the store assigns uid and initial generation
    pub fn create<R: Record>(&self, mut record: R) -> Result<R, Error> {
        let bucket = self.bucket::<R>();
        record.meta_mut().uid = Uuid::new_v4();
        record.meta_mut().generation = 1;
        {
            let mut data = bucket.data.write();
            if data.contains_key(record.name()) {
                return Err(Error::AlreadyExists {
                    kind: R::KIND,
                    name: record.name().to_string(),
                });
            }
            data.insert(record.name().to_string(), record.clone());
        }
        bucket.notify(StoreEvent::Applied(record.clone()));
        Ok(record)
    }

    pub fn get<R: Record>(&self, name: &str) -> Option<R> {
        self.bucket::<R>().data.read().get(name).cloned()
    }

    pub fn list<R: Record>(&self) -> Vec<R> {
        self.bucket::<R>().data.read().values().cloned().collect()
    }

    pub fn list_filtered<R: Record>(&self, mut keep: impl FnMut(&R) -> bool) -> Vec<R> {
        self.bucket::<R>()
            .data
            .read()
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    /// Records carrying the given label value
    pub fn list_labeled<R: Record>(&self, key: &str, value: &str) -> Vec<R> {
        self.list_filtered(|r: &R| r.meta().label(key) == Some(value))
    }

    /// Records whose controller reference points at the given uid
    pub fn list_owned_by<R: Record>(&self, owner_uid: Uuid) -> Vec<R> {
        self.list_filtered(|r: &R| r.meta().owner.as_ref().is_some_and(|o| o.uid == owner_uid))
    }

    /// Replace a record. Fails with a conflict when the stored generation
    /// differs from the one the caller read.
    pub fn update<R: Record>(&self, mut record: R) -> Result<R, Error> {
        let bucket = self.bucket::<R>();
        {
            let mut data = bucket.data.write();
            let Some(stored) = data.get(record.name()) else {
                return Err(Error::NotFound {
                    kind: R::KIND,
                    name: record.name().to_string(),
                });
            };
            if stored.meta().generation != record.meta().generation {
                return Err(Error::Conflict {
                    kind: R::KIND,
                    name: record.name().to_string(),
                    expected: record.meta().generation,
                    observed: stored.meta().generation,
                });
            }
            record.meta_mut().generation += 1;
            data.insert(record.name().to_string(), record.clone());
        }
        bucket.notify(StoreEvent::Applied(record.clone()));
        Ok(record)
    }

    /// Delete a record and, in background-propagation style, every record
    /// whose controller reference points at it
    pub fn delete<R: Record>(&self, name: &str) -> Result<(), Error> {
        let bucket = self.bucket::<R>();
        let removed = bucket.data.write().remove(name);
        let Some(removed) = removed else {
            return Err(Error::NotFound {
                kind: R::KIND,
                name: name.to_string(),
            });
        };
        let uid = removed.meta().uid;
        bucket.notify(StoreEvent::Deleted(removed));
        self.cascade(uid);
        Ok(())
    }

    pub fn watch<R: Record>(&self) -> broadcast::Receiver<StoreEvent<R>> {
        self.bucket::<R>().tx.subscribe()
    }

    fn cascade(&self, owner_uid: Uuid) {
        let cascaders: Vec<Cascader> = self.inner.read().cascaders.clone();
        for cascade in cascaders {
            cascade(self, owner_uid);
        }
    }

    fn delete_owned<R: Record>(&self, owner_uid: Uuid) {
        let bucket = self.bucket::<R>();
        let victims: Vec<R> = bucket
            .data
            .read()
            .values()
            .filter(|r| r.meta().owner.as_ref().is_some_and(|o| o.uid == owner_uid))
            .cloned()
            .collect();
        for victim in victims {
            bucket.data.write().remove(victim.name());
            let uid = victim.meta().uid;
            bucket.notify(StoreEvent::Deleted(victim));
            self.cascade(uid);
        }
    }
}
