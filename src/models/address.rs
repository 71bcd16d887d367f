//! Contact address extended with INSEE links.

use serde::{Deserialize, Deserializer, Serialize};

use crate::store::{Entity, Id};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub street: String,
    pub zip: String,
    /// Display city name.
    pub city: String,
    pub country_id: Option<Id>,
    pub insee_region_id: Option<Id>,
    pub insee_department_id: Option<Id>,
    pub insee_city_id: Option<Id>,
    /// Business ZIP code (Cedex).
    pub cedex: String,
    /// Canonical name of the selected INSEE city.
    pub insee_city_ncc: String,
}

impl Entity for Address {
    const KIND: &'static str = "address";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(&self.name),
            "street" => Some(&self.street),
            "zip" => Some(&self.zip),
            "city" => Some(&self.city),
            "cedex" => Some(&self.cedex),
            "insee_city_ncc" => Some(&self.insee_city_ncc),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.name
    }
}

/// Partial update of an [`Address`].
///
/// `None` leaves a field untouched. Link fields use `Some(None)` to clear the
/// link; in JSON that is an explicit `null`, while a missing key means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub country_id: Option<Option<Id>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub insee_region_id: Option<Option<Id>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub insee_department_id: Option<Option<Id>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub insee_city_id: Option<Option<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cedex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insee_city_ncc: Option<String>,
}

/// A key that is present is a change, even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl AddressChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy every set field onto `address`.
    pub fn apply(self, address: &mut Address) {
        if let Some(v) = self.name {
            address.name = v;
        }
        if let Some(v) = self.street {
            address.street = v;
        }
        if let Some(v) = self.zip {
            address.zip = v;
        }
        if let Some(v) = self.city {
            address.city = v;
        }
        if let Some(v) = self.country_id {
            address.country_id = v;
        }
        if let Some(v) = self.insee_region_id {
            address.insee_region_id = v;
        }
        if let Some(v) = self.insee_department_id {
            address.insee_department_id = v;
        }
        if let Some(v) = self.insee_city_id {
            address.insee_city_id = v;
        }
        if let Some(v) = self.cedex {
            address.cedex = v;
        }
        if let Some(v) = self.insee_city_ncc {
            address.insee_city_ncc = v;
        }
    }
}
