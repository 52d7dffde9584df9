use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::entity::EntityId;
use crate::domain::item::{CatalogEntry, Holding, ItemKind};
use crate::domain::trade::{TransferOrder, TransferReceipt};
use crate::errors::{ApplicationError, DomainError};
use crate::ledger::{validate_order, Catalog, InventoryLedger};

#[derive(Default)]
struct Book {
    catalog: BTreeMap<ItemKind, CatalogEntry>,
    stock: HashMap<(EntityId, ItemKind), u32>,
}

impl Book {
    fn quantity(&self, entity: &EntityId, item: &ItemKind) -> u32 {
        self.stock.get(&(entity.clone(), item.clone())).copied().unwrap_or(0)
    }
}

/// Process-local ledger. A single mutex is the serialization point for every
/// read-check-write sequence.
#[derive(Default)]
pub struct InMemoryLedger {
    book: Mutex<Book>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Book>, ApplicationError> {
        self.book
            .lock()
            .map_err(|_| ApplicationError::Persistence("in-memory ledger lock poisoned".to_owned()))
    }
}

#[async_trait]
impl Catalog for InMemoryLedger {
    async fn entry(&self, item: &ItemKind) -> Result<Option<CatalogEntry>, ApplicationError> {
        Ok(self.lock()?.catalog.get(item).cloned())
    }

    async fn register(&self, entry: CatalogEntry) -> Result<(), ApplicationError> {
        let mut book = self.lock()?;
        if book.catalog.contains_key(&entry.item) {
            return Err(DomainError::DuplicateItem(entry.item).into());
        }
        book.catalog.insert(entry.item.clone(), entry);
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    async fn quantity_of(
        &self,
        entity: &EntityId,
        item: &ItemKind,
    ) -> Result<u32, ApplicationError> {
        Ok(self.lock()?.quantity(entity, item))
    }

    async fn transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, ApplicationError> {
        validate_order(order)?;
        let mut book = self.lock()?;

        let unit_price = book
            .catalog
            .get(&order.item)
            .map(CatalogEntry::price)
            .ok_or_else(|| DomainError::UnknownItem(order.item.clone()))?;

        let available = book.quantity(&order.from, &order.item);
        if available < order.quantity {
            return Err(DomainError::InsufficientStock {
                item: order.item.clone(),
                available,
                requested: order.quantity,
            }
            .into());
        }
        let credited = book
            .quantity(&order.to, &order.item)
            .checked_add(order.quantity)
            .ok_or(DomainError::InvalidQuantity(i64::from(order.quantity)))?;

        book.stock.insert((order.from.clone(), order.item.clone()), available - order.quantity);
        book.stock.insert((order.to.clone(), order.item.clone()), credited);

        Ok(TransferReceipt::new(order.clone(), unit_price))
    }

    async fn holdings(&self, entity: &EntityId) -> Result<Vec<Holding>, ApplicationError> {
        let book = self.lock()?;
        let mut holdings = book
            .stock
            .iter()
            .filter(|((owner, _), quantity)| owner == entity && **quantity > 0)
            .map(|((_, item), quantity)| Holding {
                item: item.clone(),
                quantity: *quantity,
                unit_price: book.catalog.get(item).map(CatalogEntry::price).unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        holdings.sort_by(|left, right| left.item.cmp(&right.item));
        Ok(holdings)
    }

    async fn deposit(
        &self,
        entity: &EntityId,
        item: &ItemKind,
        quantity: u32,
    ) -> Result<u32, ApplicationError> {
        let mut book = self.lock()?;
        if !book.catalog.contains_key(item) {
            return Err(DomainError::UnknownItem(item.clone()).into());
        }
        let updated = book
            .quantity(entity, item)
            .checked_add(quantity)
            .ok_or(DomainError::InvalidQuantity(i64::from(quantity)))?;
        book.stock.insert((entity.clone(), item.clone()), updated);
        Ok(updated)
    }
}
