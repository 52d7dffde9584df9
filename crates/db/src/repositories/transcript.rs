use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use parley_core::domain::entity::ConversationKey;
use parley_core::errors::ApplicationError;
use parley_core::transcript::{Speaker, TranscriptEntry, TranscriptStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlTranscriptStore {
    pool: DbPool,
}

impl SqlTranscriptStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        key: &ConversationKey,
        speaker: Speaker,
        text: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO transcript (player_id, npc_id, role, text, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key.player.as_str())
        .bind(key.npc.as_str())
        .bind(speaker.as_str())
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn window(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<TranscriptEntry>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT role, text, created_at
             FROM transcript
             WHERE player_id = ? AND npc_id = ? AND TRIM(text) <> ''
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(key.player.as_str())
        .bind(key.npc.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at")?;
                Ok(TranscriptEntry {
                    speaker: row
                        .try_get::<String, _>("role")?
                        .parse()
                        .map_err(RepositoryError::Decode)?,
                    text: row.try_get("text")?,
                    recorded_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|value| value.with_timezone(&Utc))
                        .map_err(|error| {
                            RepositoryError::Decode(format!("invalid created_at: {error}"))
                        })?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        entries.reverse();
        Ok(entries)
    }
}

#[async_trait]
impl TranscriptStore for SqlTranscriptStore {
    async fn append(
        &self,
        key: &ConversationKey,
        speaker: Speaker,
        text: &str,
    ) -> Result<(), ApplicationError> {
        Ok(self.insert(key, speaker, text).await?)
    }

    async fn recent(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<TranscriptEntry>, ApplicationError> {
        Ok(self.window(key, limit).await?)
    }
}
