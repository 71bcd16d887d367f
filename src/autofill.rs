//! Address fields derived from the selected INSEE city.

use thiserror::Error;
use tracing::debug;

use crate::models::{Address, AddressChanges, City};
use crate::store::{Entity, Filter, Id, Record, ReferenceStore, StoreError};

/// Name of the country forced on addresses in France.
pub const FRANCE: &str = "France";

#[derive(Debug, Error)]
pub enum AutoFillError {
    #[error("no country named '{0}' in the reference data")]
    MissingCountry(String),

    #[error("INSEE city {0} not found")]
    UnknownCity(Id),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AutoFillResult<T> = std::result::Result<T, AutoFillError>;

/// Reacts to the city field of an address changing.
pub struct AutoFill<'a> {
    store: &'a ReferenceStore,
}

impl<'a> AutoFill<'a> {
    pub fn new(store: &'a ReferenceStore) -> Self {
        Self { store }
    }

    /// Field updates for a newly selected city. Nothing changes when the
    /// selection is cleared.
    pub fn on_city_changed(&self, city_id: Option<Id>) -> AutoFillResult<AddressChanges> {
        let Some(city_id) = city_id else {
            return Ok(AddressChanges::default());
        };

        let city = self.city(city_id)?;
        let department_id = city.department_id;
        let region_id = city.region_insee(&*self.store.departments)?;
        let france_id = self.france()?;

        let zip = self
            .store
            .zipcodes
            .find(&Filter::new().eq("insee", city.city_code()))?
            .into_iter()
            .next()
            .map(|z| z.value.codepos)
            .unwrap_or_default();

        debug!(
            "City {} ({}) selected, zip '{}'",
            city_id,
            city.city_code(),
            zip
        );

        let abroad = city.is_abroad();
        Ok(AddressChanges {
            zip: Some(zip),
            city: Some(if abroad { String::new() } else { city.ncc.clone() }),
            country_id: Some(if abroad { None } else { Some(france_id) }),
            insee_department_id: Some(department_id),
            insee_region_id: Some(region_id),
            insee_city_ncc: Some(city.ncc),
            ..Default::default()
        })
    }

    fn city(&self, id: Id) -> AutoFillResult<City> {
        self.store
            .cities
            .browse(id)?
            .map(|r| r.value)
            .ok_or(AutoFillError::UnknownCity(id))
    }

    fn france(&self) -> AutoFillResult<Id> {
        self.store
            .countries
            .search(&Filter::new().eq("name", FRANCE))?
            .first()
            .copied()
            .ok_or_else(|| AutoFillError::MissingCountry(FRANCE.to_string()))
    }
}

/// Address create/write that keeps the display city name in step with the
/// INSEE city link.
pub struct AddressService<'a> {
    store: &'a ReferenceStore,
}

impl<'a> AddressService<'a> {
    pub fn new(store: &'a ReferenceStore) -> Self {
        Self { store }
    }

    pub fn create(&self, mut changes: AddressChanges) -> AutoFillResult<Record<Address>> {
        self.fill_city(&mut changes)?;
        let mut address = Address::default();
        changes.apply(&mut address);
        let id = self.store.addresses.create(address.clone())?;
        Ok(Record { id, value: address })
    }

    pub fn write(&self, id: Id, mut changes: AddressChanges) -> AutoFillResult<Record<Address>> {
        self.fill_city(&mut changes)?;

        let _guard = self.store.lock_addresses()?;
        let mut address = self
            .store
            .addresses
            .browse(id)?
            .ok_or(StoreError::NotFound {
                kind: Address::KIND,
                id,
            })?
            .value;
        changes.apply(&mut address);
        self.store.addresses.write(id, address.clone())?;
        Ok(Record { id, value: address })
    }

    /// Set `city` from the linked city's enriched name, unless the caller
    /// sets `city` itself.
    fn fill_city(&self, changes: &mut AddressChanges) -> AutoFillResult<()> {
        if changes.city.is_some() {
            return Ok(());
        }
        let Some(link) = changes.insee_city_id else {
            return Ok(());
        };

        let city = match link {
            Some(id) => AutoFill::new(self.store).city(id)?.nccenr,
            None => String::new(),
        };
        changes.city = Some(city);
        Ok(())
    }
}
