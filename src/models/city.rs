use serde::{Deserialize, Serialize};

use super::{Department, Region};
use crate::store::{Entity, Id, Repository, StoreResult};

/// Canonical name INSEE uses for "commune abroad, unspecified".
pub const ABROAD: &str = "ETRANGER";

/// INSEE commune (comsimp2011.csv).
///
/// `city_code` is derived from `dep` and `com` and is only changed through
/// [`City::new`], [`City::set_dep`] and [`City::set_com`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    /// Name with its article prepended, upper case.
    pub ncc: String,
    pub cdc: String,
    pub cheflieu: String,
    pub reg: String,
    dep: String,
    pub department_id: Option<Id>,
    com: String,
    pub ar: String,
    pub ct: String,
    pub tncc: String,
    pub artmaj: String,
    pub artmin: String,
    /// Enriched name with its article prepended.
    pub nccenr: String,
    city_code: String,
}

impl City {
    pub fn new(dep: &str, com: &str) -> Self {
        Self {
            dep: dep.to_string(),
            com: com.to_string(),
            city_code: city_code(dep, com),
            ..Default::default()
        }
    }

    pub fn dep(&self) -> &str {
        &self.dep
    }

    pub fn com(&self) -> &str {
        &self.com
    }

    /// Five character INSEE commune code, see [`city_code`].
    pub fn city_code(&self) -> &str {
        &self.city_code
    }

    pub fn set_dep(&mut self, dep: &str) {
        self.dep = dep.to_string();
        self.city_code = city_code(&self.dep, &self.com);
    }

    pub fn set_com(&mut self, com: &str) {
        self.com = com.to_string();
        self.city_code = city_code(&self.dep, &self.com);
    }

    /// "PARIS (75)"
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.ncc, self.dep)
    }

    pub fn is_abroad(&self) -> bool {
        self.ncc == ABROAD
    }

    /// Code of the linked department, if any.
    pub fn department_insee(
        &self,
        departments: &dyn Repository<Department>,
    ) -> StoreResult<Option<String>> {
        match self.department_id {
            Some(id) => Ok(departments.browse(id)?.map(|d| d.value.dep)),
            None => Ok(None),
        }
    }

    /// Region reached through the linked department.
    pub fn region_insee(
        &self,
        departments: &dyn Repository<Department>,
    ) -> StoreResult<Option<Id>> {
        match self.department_id {
            Some(id) => Ok(departments.browse(id)?.map(|d| d.value.region_id)),
            None => Ok(None),
        }
    }

    /// Region record reached through the linked department.
    pub fn region(
        &self,
        departments: &dyn Repository<Department>,
        regions: &dyn Repository<Region>,
    ) -> StoreResult<Option<Region>> {
        match self.region_insee(departments)? {
            Some(id) => Ok(regions.browse(id)?.map(|r| r.value)),
            None => Ok(None),
        }
    }
}

impl Entity for City {
    const KIND: &'static str = "city";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "ncc" => Some(&self.ncc),
            "cdc" => Some(&self.cdc),
            "cheflieu" => Some(&self.cheflieu),
            "reg" => Some(&self.reg),
            "dep" => Some(&self.dep),
            "com" => Some(&self.com),
            "ar" => Some(&self.ar),
            "ct" => Some(&self.ct),
            "tncc" => Some(&self.tncc),
            "artmaj" => Some(&self.artmaj),
            "artmin" => Some(&self.artmin),
            "nccenr" => Some(&self.nccenr),
            "city_code" => Some(&self.city_code),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.ncc
    }
}

/// INSEE commune code from department and commune numbers.
///
/// Mainland departments have one or two characters and communes three digits;
/// overseas departments have three characters and communes two digits.
pub fn city_code(dep: &str, com: &str) -> String {
    if dep.chars().count() < 3 {
        format!("{}{:0>3}", dep, com)
    } else {
        format!("{}{:0>2}", dep, com)
    }
}

/// Prepend a name article such as "(LE)" to a name, without parentheses.
pub fn compose_name(article: &str, name: &str) -> String {
    if article.is_empty() {
        name.to_string()
    } else {
        format!("{}{}", article.trim_matches(|c| c == '(' || c == ')'), name)
    }
}
