//! In-memory repository.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{sort_records, Entity, Filter, Id, Record, Repository, StoreError, StoreResult};

struct Inner<T> {
    next_id: u64,
    rows: BTreeMap<Id, T>,
}

/// Repository keeping every record in a map guarded by a lock.
pub struct MemoryRepository<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
        }
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn create(&self, value: T) -> StoreResult<Id> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Poisoned(T::KIND))?;
        let id = Id(inner.next_id);
        inner.next_id += 1;
        inner.rows.insert(id, value);
        Ok(id)
    }

    fn write(&self, id: Id, value: T) -> StoreResult<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Poisoned(T::KIND))?;
        match inner.rows.get_mut(&id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoreError::NotFound { kind: T::KIND, id }),
        }
    }

    fn search(&self, filter: &Filter) -> StoreResult<Vec<Id>> {
        let compiled = filter.compile()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned(T::KIND))?;
        let mut found: Vec<Record<T>> = inner
            .rows
            .iter()
            .filter(|(_, value)| compiled.matches(*value))
            .map(|(id, value)| Record {
                id: *id,
                value: value.clone(),
            })
            .collect();
        sort_records(&mut found);
        Ok(found.into_iter().map(|r| r.id).collect())
    }

    fn read(&self, ids: &[Id]) -> StoreResult<Vec<Record<T>>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned(T::KIND))?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                inner.rows.get(id).map(|value| Record {
                    id: *id,
                    value: value.clone(),
                })
            })
            .collect())
    }

    fn count(&self) -> StoreResult<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Poisoned(T::KIND))?;
        Ok(inner.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZipCode;

    fn zipcode(codepos: &str, insee: &str) -> ZipCode {
        ZipCode {
            commune: "TEST".into(),
            codepos: codepos.into(),
            dep: insee[..2].into(),
            insee: insee.into(),
        }
    }

    #[test]
    fn test_search_orders_by_sort_key() {
        let repo = MemoryRepository::<ZipCode>::new();
        let late = repo.create(zipcode("75020", "75056")).unwrap();
        let early = repo.create(zipcode("75001", "75056")).unwrap();

        let ids = repo.search(&Filter::new().eq("insee", "75056")).unwrap();
        assert_eq!(ids, vec![early, late]);
    }

    #[test]
    fn test_write_unknown_id_fails() {
        let repo = MemoryRepository::<ZipCode>::new();
        let err = repo.write(Id(42), zipcode("01000", "01053")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: Id(42), .. }));
    }

    #[test]
    fn test_read_skips_unknown_ids() {
        let repo = MemoryRepository::<ZipCode>::new();
        let id = repo.create(zipcode("01000", "01053")).unwrap();
        let records = repo.read(&[Id(99), id]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert!(repo.browse(Id(99)).unwrap().is_none());
    }
}
