//! INSEE - French administrative reference data.
//!
//! Imports INSEE regions, departments, postal codes and communes into a
//! reference store, and derives address fields from a selected commune.
//! Shared by the `ingest` and `query` binaries.

pub mod autofill;
pub mod importer;
pub mod loader;
pub mod models;
pub mod store;

pub use autofill::{AddressService, AutoFill, AutoFillError};
pub use importer::{ImportError, ImportReport, Importer, ReimportPolicy, Stage};
pub use models::{Address, AddressChanges, City, Country, Department, Region, ZipCode};
pub use store::{Filter, Id, ReferenceStore, Repository};
