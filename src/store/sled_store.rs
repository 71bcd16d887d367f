//! Sled-backed persistent repository.

use std::marker::PhantomData;

use sled::{Db, Tree};
use tracing::debug;

use super::{sort_records, Entity, Filter, Id, Record, Repository, StoreError, StoreResult};

/// One sled tree per entity type; keys are big-endian ids, values JSON.
pub struct SledRepository<T> {
    db: Db,
    tree: Tree,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> SledRepository<T> {
    pub fn open(db: &Db) -> StoreResult<Self> {
        let tree = db.open_tree(T::KIND)?;
        debug!("Opened sled tree {} ({} records)", T::KIND, tree.len());
        Ok(Self {
            db: db.clone(),
            tree,
            _marker: PhantomData,
        })
    }

    fn decode(key: &[u8], value: &[u8]) -> StoreResult<Record<T>> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&key[..8]);
        Ok(Record {
            id: Id(u64::from_be_bytes(raw)),
            value: serde_json::from_slice(value)?,
        })
    }
}

impl<T: Entity> Repository<T> for SledRepository<T> {
    fn create(&self, value: T) -> StoreResult<Id> {
        // ids start at 1, as in MemoryRepository
        let id = Id(self.db.generate_id()? + 1);
        self.tree
            .insert(id.0.to_be_bytes(), serde_json::to_vec(&value)?)?;
        Ok(id)
    }

    fn write(&self, id: Id, value: T) -> StoreResult<()> {
        let key = id.0.to_be_bytes();
        if !self.tree.contains_key(key)? {
            return Err(StoreError::NotFound { kind: T::KIND, id });
        }
        self.tree.insert(key, serde_json::to_vec(&value)?)?;
        Ok(())
    }

    fn search(&self, filter: &Filter) -> StoreResult<Vec<Id>> {
        let compiled = filter.compile()?;
        let mut found = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let record = Self::decode(&key, &value)?;
            if compiled.matches(&record.value) {
                found.push(record);
            }
        }
        sort_records(&mut found);
        Ok(found.into_iter().map(|r| r.id).collect())
    }

    fn read(&self, ids: &[Id]) -> StoreResult<Vec<Record<T>>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.tree.get(id.0.to_be_bytes())? {
                records.push(Record {
                    id: *id,
                    value: serde_json::from_slice(&value)?,
                });
            }
        }
        Ok(records)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.tree.len())
    }
}
