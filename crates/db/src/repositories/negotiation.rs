use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use parley_core::domain::entity::ConversationKey;
use parley_core::errors::ApplicationError;
use parley_core::negotiation::{Negotiation, NegotiationState, NegotiationStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlNegotiationStore {
    pool: DbPool,
}

impl SqlNegotiationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, key: &ConversationKey) -> Result<Negotiation, RepositoryError> {
        let row = sqlx::query(
            "SELECT state, pending_intent_json, confirmation_prompt, unsure_rounds
             FROM negotiations
             WHERE player_id = ? AND npc_id = ?",
        )
        .bind(key.player.as_str())
        .bind(key.npc.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(Negotiation::new(key.clone()));
        };

        let state = row
            .try_get::<String, _>("state")?
            .parse::<NegotiationState>()
            .map_err(RepositoryError::Decode)?;
        let pending = row
            .try_get::<Option<String>, _>("pending_intent_json")?
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("invalid pending intent: {error}")))?;
        let unsure_rounds = u32::try_from(row.try_get::<i64, _>("unsure_rounds")?)
            .map_err(|_| RepositoryError::Decode("unsure_rounds out of range".to_owned()))?;

        Ok(Negotiation {
            key: key.clone(),
            state,
            pending,
            confirmation_prompt: row.try_get("confirmation_prompt")?,
            unsure_rounds,
        })
    }

    async fn upsert(&self, record: &Negotiation) -> Result<(), RepositoryError> {
        let pending = record
            .pending
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("encode pending intent: {error}")))?;

        sqlx::query(
            "INSERT INTO negotiations (
                player_id, npc_id, state, pending_intent_json, confirmation_prompt,
                unsure_rounds, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(player_id, npc_id) DO UPDATE SET
                state = excluded.state,
                pending_intent_json = excluded.pending_intent_json,
                confirmation_prompt = excluded.confirmation_prompt,
                unsure_rounds = excluded.unsure_rounds,
                updated_at = excluded.updated_at",
        )
        .bind(record.key.player.as_str())
        .bind(record.key.npc.as_str())
        .bind(record.state.as_str())
        .bind(pending)
        .bind(record.confirmation_prompt.as_deref())
        .bind(i64::from(record.unsure_rounds))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NegotiationStore for SqlNegotiationStore {
    async fn load(&self, key: &ConversationKey) -> Result<Negotiation, ApplicationError> {
        Ok(self.fetch(key).await?)
    }

    async fn save(&self, record: &Negotiation) -> Result<(), ApplicationError> {
        Ok(self.upsert(record).await?)
    }

    async fn reset(&self, key: &ConversationKey) -> Result<(), ApplicationError> {
        Ok(self.upsert(&Negotiation::new(key.clone())).await?)
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::entity::ConversationKey;
    use parley_core::domain::item::ItemKind;
    use parley_core::domain::trade::{TradeDirection, TradeIntent};
    use parley_core::errors::ApplicationError;
    use parley_core::negotiation::{Negotiation, NegotiationState, NegotiationStore};

    use super::SqlNegotiationStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlNegotiationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlNegotiationStore::new(pool)
    }

    fn key() -> ConversationKey {
        ConversationKey::new("2", "1")
    }

    fn rum(quantity: u32) -> TradeIntent {
        TradeIntent { direction: TradeDirection::Buy, item: ItemKind::new("rum"), quantity }
    }

    #[tokio::test]
    async fn unknown_conversations_load_as_no_trade() {
        let store = store().await;

        let record = store.load(&key()).await.expect("load");

        assert_eq!(record, Negotiation::new(key()));
    }

    #[tokio::test]
    async fn pending_intent_and_prompt_survive_a_round_trip() {
        let store = store().await;
        let mut record = Negotiation::awaiting(key(), rum(2))
            .with_confirmation_prompt("Ye want 2 rum for 6.00 gold?");
        record.unsure_rounds = 2;

        store.save(&record).await.expect("save");

        assert_eq!(store.load(&key()).await, Ok(record));
    }

    #[tokio::test]
    async fn saving_twice_overwrites_the_record() {
        let store = store().await;
        store.save(&Negotiation::awaiting(key(), rum(2))).await.expect("first save");

        store.save(&Negotiation::new(key())).await.expect("second save");

        let record = store.load(&key()).await.expect("load");
        assert_eq!(record.state, NegotiationState::NoTrade);
        assert_eq!(record.pending, None);
    }

    #[tokio::test]
    async fn reset_only_touches_its_own_conversation() {
        let store = store().await;
        let other = ConversationKey::new("3", "1");
        store.save(&Negotiation::awaiting(key(), rum(1))).await.expect("save mine");
        store.save(&Negotiation::awaiting(other.clone(), rum(4))).await.expect("save other");

        store.reset(&key()).await.expect("reset");

        assert!(!store.load(&key()).await.expect("mine").is_awaiting_consent());
        assert_eq!(store.load(&other).await.expect("other").pending, Some(rum(4)));
    }

    #[tokio::test]
    async fn corrupt_rows_surface_as_persistence_errors() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO negotiations (player_id, npc_id, state, pending_intent_json, updated_at)
             VALUES ('2', '1', 'awaiting_consent', '{not json', '2026-01-01T00:00:00Z')",
        )
        .execute(&store.pool)
        .await
        .expect("insert corrupt row");

        let error = store.load(&key()).await.expect_err("corrupt row");

        assert!(matches!(error, ApplicationError::Persistence(_)));
    }
}
