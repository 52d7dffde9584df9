use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical item identity. Construct through [`crate::intent::normalize_item_name`]
/// when the name comes from free text; `new` does not canonicalize.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKind(pub String);

impl ItemKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item: ItemKind,
    pub description: String,
    pub unit_price: Option<Decimal>,
}

impl CatalogEntry {
    pub fn new(item: impl Into<String>, unit_price: Option<Decimal>) -> Self {
        Self { item: ItemKind::new(item), description: String::new(), unit_price }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Unpriced items trade at zero.
    pub fn price(&self) -> Decimal {
        self.unit_price.unwrap_or(Decimal::ZERO)
    }
}

/// One line of an entity's inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub item: ItemKind,
    pub quantity: u32,
    pub unit_price: Decimal,
}
