use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Opening stock of the demo world. Must agree with `demo_seed.sql`.
const SEED_STOCK: &[SeedStock] = &[
    SeedStock { entity_id: "1", item: "rum", quantity: 5 },
    SeedStock { entity_id: "1", item: "apple", quantity: 20 },
    SeedStock { entity_id: "1", item: "sword", quantity: 2 },
    SeedStock { entity_id: "1", item: "bread", quantity: 10 },
    SeedStock { entity_id: "1", item: "lantern", quantity: 3 },
    SeedStock { entity_id: "2", item: "apple", quantity: 2 },
    SeedStock { entity_id: "2", item: "bread", quantity: 1 },
];

const SEED_ENTITIES: &[&str] = &["1", "2"];

#[derive(Clone, Copy, Debug)]
struct SeedStock {
    entity_id: &'static str,
    item: &'static str,
    quantity: i64,
}

/// The demo world: one pirate merchant (`1`), one player (`2`) and a small
/// priced catalog. Loading is idempotent and never overwrites traded stock.
pub struct DemoSeed;

impl DemoSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let items: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM items").fetch_one(pool).await?;
        Ok(SeedResult {
            entities: SEED_ENTITIES.len(),
            catalog_items: usize::try_from(items).unwrap_or_default(),
            stock_lines: SEED_STOCK.len(),
        })
    }

    /// Checks that the seeded rows are present. Stock counts are only
    /// compared when `pristine` is set, since trades move them.
    pub async fn verify(
        pool: &DbPool,
        pristine: bool,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for entity in SEED_ENTITIES {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1)")
                    .bind(entity)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("entity:{entity}"), exists == 1));
        }

        for line in SEED_STOCK {
            let quantity: Option<i64> = sqlx::query_scalar(
                "SELECT quantity FROM inventory WHERE entity_id = ?1 AND item_name = ?2",
            )
            .bind(line.entity_id)
            .bind(line.item)
            .fetch_optional(pool)
            .await?;
            let ok = match quantity {
                Some(quantity) => !pristine || quantity == line.quantity,
                None => false,
            };
            checks.push((format!("stock:{}:{}", line.entity_id, line.item), ok));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every row the demo world owns, including trade history.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for statement in [
            "DELETE FROM trade_journal",
            "DELETE FROM transcript",
            "DELETE FROM negotiations",
            "DELETE FROM inventory",
            "DELETE FROM items",
            "DELETE FROM entities",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub entities: usize,
    pub catalog_items: usize,
    pub stock_lines: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use parley_core::domain::entity::EntityId;
    use parley_core::domain::item::ItemKind;
    use parley_core::domain::trade::TransferOrder;
    use parley_core::ledger::InventoryLedger;

    use super::DemoSeed;
    use crate::repositories::SqlInventoryLedger;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_not_empty() {
        assert!(DemoSeed::SQL.contains("Captain Barnacle"));
    }

    #[tokio::test]
    async fn seed_loads_and_verifies() {
        let pool = pool().await;

        let seeded = DemoSeed::load(&pool).await.expect("load");
        let verification = DemoSeed::verify(&pool, true).await.expect("verify");

        assert_eq!(seeded.entities, 2);
        assert_eq!(seeded.catalog_items, 5);
        assert!(verification.all_present, "{:?}", verification.checks);
    }

    #[tokio::test]
    async fn reloading_does_not_restock_traded_items() {
        let pool = pool().await;
        DemoSeed::load(&pool).await.expect("load");
        let ledger = SqlInventoryLedger::new(pool.clone());
        ledger
            .transfer(&TransferOrder {
                from: EntityId::new("1"),
                to: EntityId::new("2"),
                item: ItemKind::new("rum"),
                quantity: 2,
            })
            .await
            .expect("buy rum");

        DemoSeed::load(&pool).await.expect("reload");

        assert_eq!(ledger.quantity_of(&EntityId::new("1"), &ItemKind::new("rum")).await, Ok(3));
        assert!(!DemoSeed::verify(&pool, true).await.expect("verify pristine").all_present);
        assert!(DemoSeed::verify(&pool, false).await.expect("verify present").all_present);
    }

    #[tokio::test]
    async fn clean_empties_the_world() {
        let pool = pool().await;
        DemoSeed::load(&pool).await.expect("load");

        DemoSeed::clean(&pool).await.expect("clean");

        let verification = DemoSeed::verify(&pool, false).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }
}
