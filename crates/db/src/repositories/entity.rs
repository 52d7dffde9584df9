use async_trait::async_trait;
use sqlx::Row;

use parley_core::domain::entity::{Entity, EntityId, EntityRole};

use super::{EntityDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlEntityDirectory {
    pool: DbPool,
}

impl SqlEntityDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityDirectory for SqlEntityDirectory {
    async fn find(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, role, persona FROM entities WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let role = match row.try_get::<String, _>("role")?.as_str() {
                "player" => EntityRole::Player,
                "npc" => EntityRole::Npc,
                other => {
                    return Err(RepositoryError::Decode(format!("unknown entity role `{other}`")))
                }
            };
            Ok(Entity {
                id: EntityId(row.try_get("id")?),
                name: row.try_get("name")?,
                role,
                persona: row.try_get("persona")?,
            })
        })
        .transpose()
    }

    async fn save(&self, entity: Entity) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO entities (id, name, role, persona) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                persona = excluded.persona",
        )
        .bind(entity.id.as_str())
        .bind(&entity.name)
        .bind(entity.role.as_str())
        .bind(entity.persona.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
