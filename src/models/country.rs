use serde::{Deserialize, Serialize};

use crate::store::Entity;

/// Country record owned by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub code: String,
}

impl Entity for Country {
    const KIND: &'static str = "country";

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(&self.name),
            "code" => Some(&self.code),
            _ => None,
        }
    }

    fn sort_key(&self) -> &str {
        &self.name
    }
}
