use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use parley_core::domain::entity::{ConversationKey, Entity, EntityId};
use parley_core::errors::ApplicationError;
use parley_core::negotiation::{Negotiation, NegotiationStore};
use parley_core::transcript::{Speaker, TranscriptEntry, TranscriptStore};

use super::{EntityDirectory, RepositoryError};

#[derive(Default)]
pub struct InMemoryNegotiationStore {
    records: RwLock<HashMap<ConversationKey, Negotiation>>,
}

#[async_trait]
impl NegotiationStore for InMemoryNegotiationStore {
    async fn load(&self, key: &ConversationKey) -> Result<Negotiation, ApplicationError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned().unwrap_or_else(|| Negotiation::new(key.clone())))
    }

    async fn save(&self, record: &Negotiation) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn reset(&self, key: &ConversationKey) -> Result<(), ApplicationError> {
        let mut records = self.records.write().await;
        records.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTranscriptStore {
    entries: RwLock<HashMap<ConversationKey, Vec<TranscriptEntry>>>,
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(
        &self,
        key: &ConversationKey,
        speaker: Speaker,
        text: &str,
    ) -> Result<(), ApplicationError> {
        let mut entries = self.entries.write().await;
        entries.entry(key.clone()).or_default().push(TranscriptEntry {
            speaker,
            text: text.to_owned(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<TranscriptEntry>, ApplicationError> {
        let entries = self.entries.read().await;
        let mut window: Vec<_> = entries
            .get(key)
            .map(|all| {
                all.iter()
                    .rev()
                    .filter(|entry| !entry.text.trim().is_empty())
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        window.reverse();
        Ok(window)
    }
}

#[derive(Default)]
pub struct InMemoryEntityDirectory {
    entities: RwLock<HashMap<EntityId, Entity>>,
}

#[async_trait]
impl EntityDirectory for InMemoryEntityDirectory {
    async fn find(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        let entities = self.entities.read().await;
        Ok(entities.get(id).cloned())
    }

    async fn save(&self, entity: Entity) -> Result<(), RepositoryError> {
        let mut entities = self.entities.write().await;
        entities.insert(entity.id.clone(), entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::entity::ConversationKey;
    use parley_core::domain::item::ItemKind;
    use parley_core::domain::trade::{TradeDirection, TradeIntent};
    use parley_core::negotiation::{Negotiation, NegotiationStore};
    use parley_core::transcript::{Speaker, TranscriptStore};

    use super::{InMemoryNegotiationStore, InMemoryTranscriptStore};

    #[tokio::test]
    async fn negotiation_store_resets_to_no_trade() {
        let store = InMemoryNegotiationStore::default();
        let key = ConversationKey::new("2", "1");
        let intent =
            TradeIntent { direction: TradeDirection::Sell, item: ItemKind::new("apple"), quantity: 2 };
        store.save(&Negotiation::awaiting(key.clone(), intent)).await.expect("save");

        store.reset(&key).await.expect("reset");

        assert_eq!(store.load(&key).await, Ok(Negotiation::new(key)));
    }

    #[tokio::test]
    async fn transcript_window_matches_sql_semantics() {
        let store = InMemoryTranscriptStore::default();
        let key = ConversationKey::new("2", "1");
        for line in ["a", "", "b", "c"] {
            store.append(&key, Speaker::Npc, line).await.expect("append");
        }

        let texts: Vec<_> = store
            .recent(&key, 2)
            .await
            .expect("recent")
            .into_iter()
            .map(|entry| entry.text)
            .collect();

        assert_eq!(texts, vec!["b".to_owned(), "c".to_owned()]);
    }
}
