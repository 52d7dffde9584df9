//! Canonicalization of trade intents coming back from the language model.
//!
//! Item names are lower-cased and a single trailing `s` is stripped. This is a
//! deliberately simple singularization: it fails for irregular plurals
//! ("potatoes" -> "potatoe") and for singular nouns ending in `s`
//! ("compass" -> "compas"). Catalog names are normalized the same way, so both
//! sides of a lookup agree even when the result is not a real word.

use crate::domain::item::ItemKind;
use crate::domain::trade::{TradeDirection, TradeIntent};
use crate::errors::DomainError;

pub fn normalize(
    direction: TradeDirection,
    raw_item_name: &str,
    raw_quantity: i64,
) -> Result<TradeIntent, DomainError> {
    let item = normalize_item_name(raw_item_name)?;
    let quantity = normalize_quantity(raw_quantity)?;
    Ok(TradeIntent { direction, item, quantity })
}

pub fn normalize_item_name(raw: &str) -> Result<ItemKind, DomainError> {
    let mut name = raw.trim().to_lowercase();
    if name.ends_with('s') {
        name.pop();
    }
    let name = name.trim_end().to_owned();
    if name.is_empty() {
        return Err(DomainError::InvalidItemName(raw.to_owned()));
    }
    Ok(ItemKind(name))
}

/// Zero is kept as the vague-amount sentinel; negatives and values beyond
/// `u32` are rejected.
pub fn normalize_quantity(raw: i64) -> Result<u32, DomainError> {
    u32::try_from(raw).map_err(|_| DomainError::InvalidQuantity(raw))
}
