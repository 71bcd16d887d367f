//! Reference store abstraction.
//!
//! The importer and the address auto-fill only need three capabilities from
//! the host data store: create a record, search records matching a filter and
//! read records back by id. Each entity type gets its own typed repository.

mod filter;
mod memory;
mod sled_store;

use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Address, City, Country, Department, Region, ZipCode};

pub use self::filter::{rewrite_city_filter, search_cities, CompiledFilter, Condition, Filter, Operator};
pub use self::memory::MemoryRepository;
pub use self::sled_store::SledRepository;

/// Record identifier assigned by a repository on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub u64);

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored value together with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: Id,
    #[serde(flatten)]
    pub value: T,
}

/// A type that can be kept in a [`Repository`].
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity type name, also used as the sled tree name.
    const KIND: &'static str;

    /// Named text field access used by [`Filter`] matching.
    fn field(&self, name: &str) -> Option<&str>;

    /// Key records are ordered by in search results.
    fn sort_key(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} record {id} not found")]
    NotFound { kind: &'static str, id: Id },

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("{0} repository lock poisoned")]
    Poisoned(&'static str),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Typed access to the records of one entity type.
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert a new record and return its id.
    fn create(&self, value: T) -> StoreResult<Id>;

    /// Replace the value of an existing record.
    fn write(&self, id: Id, value: T) -> StoreResult<()>;

    /// Ids of the records matching `filter`, in entity order.
    fn search(&self, filter: &Filter) -> StoreResult<Vec<Id>>;

    /// Read the given records. Unknown ids are skipped.
    fn read(&self, ids: &[Id]) -> StoreResult<Vec<Record<T>>>;

    /// Single record access.
    fn browse(&self, id: Id) -> StoreResult<Option<Record<T>>> {
        Ok(self.read(&[id])?.into_iter().next())
    }

    fn count(&self) -> StoreResult<usize>;

    /// Search and read in one call.
    fn find(&self, filter: &Filter) -> StoreResult<Vec<Record<T>>> {
        let ids = self.search(filter)?;
        self.read(&ids)
    }
}

/// One repository per reference entity type, plus the host-owned countries
/// and addresses.
pub struct ReferenceStore {
    pub regions: Box<dyn Repository<Region>>,
    pub departments: Box<dyn Repository<Department>>,
    pub zipcodes: Box<dyn Repository<ZipCode>>,
    pub cities: Box<dyn Repository<City>>,
    pub countries: Box<dyn Repository<Country>>,
    pub addresses: Box<dyn Repository<Address>>,
    address_writes: Mutex<()>,
    db: Option<sled::Db>,
}

impl ReferenceStore {
    /// Volatile store, used by tests and embedders.
    pub fn in_memory() -> Self {
        Self {
            regions: Box::new(MemoryRepository::new()),
            departments: Box::new(MemoryRepository::new()),
            zipcodes: Box::new(MemoryRepository::new()),
            cities: Box::new(MemoryRepository::new()),
            countries: Box::new(MemoryRepository::new()),
            addresses: Box::new(MemoryRepository::new()),
            address_writes: Mutex::new(()),
            db: None,
        }
    }

    /// Persistent store backed by a sled database at `path`.
    pub fn open_sled<P: AsRef<std::path::Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_sled(db)
    }

    pub fn from_sled(db: sled::Db) -> StoreResult<Self> {
        Ok(Self {
            regions: Box::new(SledRepository::open(&db)?),
            departments: Box::new(SledRepository::open(&db)?),
            zipcodes: Box::new(SledRepository::open(&db)?),
            cities: Box::new(SledRepository::open(&db)?),
            countries: Box::new(SledRepository::open(&db)?),
            addresses: Box::new(SledRepository::open(&db)?),
            address_writes: Mutex::new(()),
            db: Some(db),
        })
    }

    /// Flush pending writes to disk (no-op for the in-memory store).
    pub fn flush(&self) -> StoreResult<()> {
        if let Some(db) = &self.db {
            db.flush()?;
        }
        Ok(())
    }

    /// Held across an address read-modify-write so concurrent updates of the
    /// same address do not drop each other's changes.
    pub(crate) fn lock_addresses(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.address_writes
            .lock()
            .map_err(|_| StoreError::Poisoned(Address::KIND))
    }

    /// Make sure a country named `name` exists, creating it if needed.
    ///
    /// Countries belong to the host application; this is only used to seed
    /// baseline data before an import.
    pub fn ensure_country(&self, name: &str, code: &str) -> StoreResult<Id> {
        let existing = self.countries.search(&Filter::new().eq("name", name))?;
        if let Some(id) = existing.first() {
            return Ok(*id);
        }
        self.countries.create(Country {
            name: name.to_string(),
            code: code.to_string(),
        })
    }
}

/// Sort records by entity key, then by id for stability.
pub(crate) fn sort_records<T: Entity>(records: &mut [Record<T>]) {
    records.sort_by(|a, b| {
        a.value
            .sort_key()
            .cmp(b.value.sort_key())
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_country_is_idempotent() {
        let store = ReferenceStore::in_memory();
        let first = store.ensure_country("France", "FR").unwrap();
        let second = store.ensure_country("France", "FR").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.countries.count().unwrap(), 1);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = Record {
            id: Id(7),
            value: Country {
                name: "France".into(),
                code: "FR".into(),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "France");
    }
}
