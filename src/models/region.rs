use serde::{Deserialize, Serialize};

use super::Department;
use crate::store::{Entity, Filter, Id, Record, Repository, StoreResult};

/// INSEE region (reg2011.csv).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region code, e.g. "11" for Ile-de-France.
    pub region: String,
    /// Administrative center (INSEE code of the prefecture commune).
    pub cheflieu: String,
    /// Name article classifier.
    pub tncc: String,
    /// Canonical upper-case name.
    pub ncc: String,
    /// Enriched name (mixed case, accents).
    pub nccenr: String,
}

impl Region {
    pub fn display_name(&self) -> &str {
        &self.ncc
    }

    /// Departments linked to this region, stored under `id`.
    pub fn departments(
        &self,
        id: Id,
        departments: &dyn Repository<Department>,
    ) -> StoreResult<Vec<Record<Department>>> {
        let mut found = departments.find(&Filter::new().eq("region", &self.region))?;
        found.retain(|d| d.value.region_id == id);
        Ok(found)
    }
}

impl Entity for Region {
    const KIND: &'static str = "region";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "region" => Some(&self.region),
            "cheflieu" => Some(&self.cheflieu),
            "tncc" => Some(&self.tncc),
            "ncc" => Some(&self.ncc),
            "nccenr" => Some(&self.nccenr),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.ncc
    }
}
