//! The inventory ledger: the only component allowed to change stock.
//!
//! Implementations must apply a transfer as one indivisible unit. The
//! stock check and both row updates happen under the same lock (in memory) or
//! inside the same write transaction with a conditional decrement (SQL), so
//! concurrent transfers can never both pass the check and drive a row negative.

mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::entity::EntityId;
use crate::domain::item::{CatalogEntry, Holding, ItemKind};
use crate::domain::trade::{TransferOrder, TransferReceipt};
use crate::errors::{ApplicationError, DomainError};

pub use memory::InMemoryLedger;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn entry(&self, item: &ItemKind) -> Result<Option<CatalogEntry>, ApplicationError>;

    async fn register(&self, entry: CatalogEntry) -> Result<(), ApplicationError>;

    /// `None` means the item is unknown; a catalogued item without a price costs zero.
    async fn price_of(&self, item: &ItemKind) -> Result<Option<Decimal>, ApplicationError> {
        Ok(self.entry(item).await?.map(|entry| entry.price()))
    }
}

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn quantity_of(&self, entity: &EntityId, item: &ItemKind)
        -> Result<u32, ApplicationError>;

    async fn transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, ApplicationError>;

    async fn holdings(&self, entity: &EntityId) -> Result<Vec<Holding>, ApplicationError>;

    /// Adds stock out of thin air. Used for seeding only, never by a trade.
    async fn deposit(
        &self,
        entity: &EntityId,
        item: &ItemKind,
        quantity: u32,
    ) -> Result<u32, ApplicationError>;
}

/// Checks that do not need to look at stock.
pub fn validate_order(order: &TransferOrder) -> Result<(), DomainError> {
    if order.quantity == 0 {
        return Err(DomainError::InvalidQuantity(0));
    }
    if order.from == order.to {
        return Err(DomainError::InvalidTransfer(order.from.0.clone()));
    }
    Ok(())
}
