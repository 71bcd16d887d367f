use serde::{Deserialize, Serialize};

use crate::store::Entity;

/// Postal code row (insee_codes_postaux.csv). `dep` is a plain copy of the
/// department code, not a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipCode {
    pub commune: String,
    pub codepos: String,
    pub dep: String,
    /// INSEE commune code, matched against [`City::city_code`](super::City::city_code).
    pub insee: String,
}

impl ZipCode {
    pub fn display_name(&self) -> &str {
        &self.codepos
    }
}

impl Entity for ZipCode {
    const KIND: &'static str = "zipcode";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "commune" => Some(&self.commune),
            "codepos" => Some(&self.codepos),
            "dep" => Some(&self.dep),
            "insee" => Some(&self.insee),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.codepos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_is_postal_code() {
        let zipcode = ZipCode {
            commune: "AJACCIO".into(),
            codepos: "20000".into(),
            dep: "2A".into(),
            insee: "2A004".into(),
        };
        assert_eq!(zipcode.display_name(), "20000");
        assert_eq!(zipcode.sort_key(), "20000");
    }
}
