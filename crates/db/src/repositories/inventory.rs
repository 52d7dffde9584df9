use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use parley_core::domain::entity::{ConversationKey, EntityId};
use parley_core::domain::item::{CatalogEntry, Holding, ItemKind};
use parley_core::domain::trade::{TradeDirection, TransferOrder, TransferReceipt};
use parley_core::errors::{ApplicationError, DomainError};
use parley_core::ledger::{validate_order, Catalog, InventoryLedger};

use super::{RepositoryError, TradeJournal, TradeRecord};
use crate::DbPool;

/// SQLite-backed ledger and catalog.
///
/// A transfer is one write transaction: a conditional decrement of the source
/// row (`quantity >= ?`), an upsert of the destination row and a journal
/// insert. The decrement runs first so the transaction takes the write lock
/// before reading anything; two writers can never both pass the stock check.
pub struct SqlInventoryLedger {
    pool: DbPool,
}

/// Adds to a holding unless the result would leave the `u32` range.
const CREDIT_SQL: &str = "INSERT INTO inventory (entity_id, item_name, quantity)
     VALUES (?, ?, ?)
     ON CONFLICT(entity_id, item_name) DO UPDATE SET
        quantity = inventory.quantity + excluded.quantity
     WHERE inventory.quantity + excluded.quantity <= ?";

impl SqlInventoryLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn apply_transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, RepositoryError> {
        validate_order(order)?;
        let quantity = i64::from(order.quantity);
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            "UPDATE inventory
             SET quantity = quantity - ?
             WHERE entity_id = ? AND item_name = ? AND quantity >= ?",
        )
        .bind(quantity)
        .bind(order.from.as_str())
        .bind(order.item.as_str())
        .bind(quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let price_row = sqlx::query("SELECT unit_price FROM items WHERE name = ?")
            .bind(order.item.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(price_row) = price_row else {
            return Err(DomainError::UnknownItem(order.item.clone()).into());
        };

        if debited == 0 {
            let available = sqlx::query(
                "SELECT quantity FROM inventory WHERE entity_id = ? AND item_name = ?",
            )
            .bind(order.from.as_str())
            .bind(order.item.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<i64, _>("quantity"))
            .transpose()?
            .unwrap_or(0);
            return Err(DomainError::InsufficientStock {
                item: order.item.clone(),
                available: quantity_from_db(available)?,
                requested: order.quantity,
            }
            .into());
        }

        let credited = sqlx::query(CREDIT_SQL)
            .bind(order.to.as_str())
            .bind(order.item.as_str())
            .bind(quantity)
            .bind(i64::from(u32::MAX))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if credited == 0 {
            return Err(DomainError::InvalidQuantity(quantity).into());
        }

        let unit_price = price_from_db(price_row.try_get("unit_price")?)?;
        let receipt = TransferReceipt::new(order.clone(), unit_price);

        sqlx::query(
            "INSERT INTO trade_journal (
                id, from_entity, to_entity, item_name, quantity, unit_price, total, executed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(order.from.as_str())
        .bind(order.to.as_str())
        .bind(order.item.as_str())
        .bind(quantity)
        .bind(receipt.unit_price.to_string())
        .bind(receipt.total.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(receipt)
    }

    async fn find_entry(&self, item: &ItemKind) -> Result<Option<CatalogEntry>, RepositoryError> {
        let row = sqlx::query("SELECT name, description, unit_price FROM items WHERE name = ?")
            .bind(item.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(CatalogEntry {
                item: ItemKind(row.try_get("name")?),
                description: row.try_get("description")?,
                unit_price: row
                    .try_get::<Option<String>, _>("unit_price")?
                    .map(|raw| parse_decimal(&raw))
                    .transpose()?,
            })
        })
        .transpose()
    }

    async fn insert_entry(&self, entry: &CatalogEntry) -> Result<(), RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO items (name, description, unit_price) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(entry.item.as_str())
        .bind(&entry.description)
        .bind(entry.unit_price.map(|price| price.to_string()))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(DomainError::DuplicateItem(entry.item.clone()).into());
        }
        Ok(())
    }

    async fn load_holdings(&self, entity: &EntityId) -> Result<Vec<Holding>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT inv.item_name, inv.quantity, i.unit_price
             FROM inventory inv
             JOIN items i ON i.name = inv.item_name
             WHERE inv.entity_id = ? AND inv.quantity > 0
             ORDER BY inv.item_name ASC",
        )
        .bind(entity.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(holding_from_row).collect()
    }

    async fn credit(
        &self,
        entity: &EntityId,
        item: &ItemKind,
        quantity: u32,
    ) -> Result<u32, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let known = sqlx::query("SELECT 1 FROM items WHERE name = ?")
            .bind(item.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(DomainError::UnknownItem(item.clone()).into());
        }

        let row = sqlx::query(&format!("{CREDIT_SQL} RETURNING quantity"))
            .bind(entity.as_str())
            .bind(item.as_str())
            .bind(i64::from(quantity))
            .bind(i64::from(u32::MAX))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::InvalidQuantity(i64::from(quantity)))?;
        tx.commit().await?;

        quantity_from_db(row.try_get("quantity")?)
    }
}

#[async_trait]
impl Catalog for SqlInventoryLedger {
    async fn entry(&self, item: &ItemKind) -> Result<Option<CatalogEntry>, ApplicationError> {
        Ok(self.find_entry(item).await?)
    }

    async fn register(&self, entry: CatalogEntry) -> Result<(), ApplicationError> {
        Ok(self.insert_entry(&entry).await?)
    }
}

#[async_trait]
impl InventoryLedger for SqlInventoryLedger {
    async fn quantity_of(
        &self,
        entity: &EntityId,
        item: &ItemKind,
    ) -> Result<u32, ApplicationError> {
        let quantity = sqlx::query(
            "SELECT quantity FROM inventory WHERE entity_id = ? AND item_name = ?",
        )
        .bind(entity.as_str())
        .bind(item.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?
        .map(|row| row.try_get::<i64, _>("quantity"))
        .transpose()
        .map_err(RepositoryError::from)?
        .unwrap_or(0);

        Ok(quantity_from_db(quantity)?)
    }

    async fn transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, ApplicationError> {
        Ok(self.apply_transfer(order).await?)
    }

    async fn holdings(&self, entity: &EntityId) -> Result<Vec<Holding>, ApplicationError> {
        Ok(self.load_holdings(entity).await?)
    }

    async fn deposit(
        &self,
        entity: &EntityId,
        item: &ItemKind,
        quantity: u32,
    ) -> Result<u32, ApplicationError> {
        Ok(self.credit(entity, item, quantity).await?)
    }
}

#[async_trait]
impl TradeJournal for SqlInventoryLedger {
    async fn list_trades(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<TradeRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, from_entity, item_name, quantity, unit_price, total, executed_at
             FROM trade_journal
             WHERE (from_entity = ? AND to_entity = ?) OR (from_entity = ? AND to_entity = ?)
             ORDER BY executed_at ASC, rowid ASC",
        )
        .bind(key.npc.as_str())
        .bind(key.player.as_str())
        .bind(key.player.as_str())
        .bind(key.npc.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| trade_from_row(key, row)).collect()
    }
}

fn holding_from_row(row: SqliteRow) -> Result<Holding, RepositoryError> {
    Ok(Holding {
        item: ItemKind(row.try_get("item_name")?),
        quantity: quantity_from_db(row.try_get("quantity")?)?,
        unit_price: price_from_db(row.try_get("unit_price")?)?,
    })
}

fn trade_from_row(key: &ConversationKey, row: SqliteRow) -> Result<TradeRecord, RepositoryError> {
    let from: String = row.try_get("from_entity")?;
    let direction =
        if from == key.npc.as_str() { TradeDirection::Buy } else { TradeDirection::Sell };
    let executed_at: String = row.try_get("executed_at")?;

    Ok(TradeRecord {
        id: row.try_get("id")?,
        direction,
        item: ItemKind(row.try_get("item_name")?),
        quantity: quantity_from_db(row.try_get("quantity")?)?,
        unit_price: parse_decimal(&row.try_get::<String, _>("unit_price")?)?,
        total: parse_decimal(&row.try_get::<String, _>("total")?)?,
        executed_at: DateTime::parse_from_rfc3339(&executed_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| RepositoryError::Decode(format!("invalid executed_at: {error}")))?,
    })
}

/// NULL prices are the "unpriced" case and trade at zero.
fn price_from_db(raw: Option<String>) -> Result<Decimal, RepositoryError> {
    raw.map(|value| parse_decimal(&value)).transpose().map(Option::unwrap_or_default)
}

fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal `{raw}`: {error}")))
}

fn quantity_from_db(raw: i64) -> Result<u32, RepositoryError> {
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("quantity {raw} is out of range")))
}
