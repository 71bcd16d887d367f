use serde::{Deserialize, Serialize};

use super::Region;
use crate::store::{Entity, Id, Repository, StoreResult};

/// INSEE department (depts2011.csv), linked to its region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Region this department belongs to; its code equals `region`.
    pub region_id: Id,
    pub region: String,
    /// Department code: two characters on the mainland ("2A" in Corsica),
    /// three overseas ("971").
    pub dep: String,
    pub cheflieu: String,
    pub tncc: String,
    pub ncc: String,
    pub nccenr: String,
}

impl Department {
    /// "75 PARIS"
    pub fn display_name(&self) -> String {
        format!("{} {}", self.dep, self.ncc)
    }

    /// Canonical name of the linked region.
    pub fn region_insee(&self, regions: &dyn Repository<Region>) -> StoreResult<Option<String>> {
        Ok(regions.browse(self.region_id)?.map(|r| r.value.ncc))
    }
}

impl Entity for Department {
    const KIND: &'static str = "department";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "region" => Some(&self.region),
            "dep" => Some(&self.dep),
            "cheflieu" => Some(&self.cheflieu),
            "tncc" => Some(&self.tncc),
            "ncc" => Some(&self.ncc),
            "nccenr" => Some(&self.nccenr),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.dep
    }
}
