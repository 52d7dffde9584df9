use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::ConversationKey;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Player,
    Npc,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Npc => "npc",
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "player" | "user" => Ok(Self::Player),
            "npc" | "assistant" => Ok(Self::Npc),
            other => Err(format!("unknown transcript speaker `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(
        &self,
        key: &ConversationKey,
        speaker: Speaker,
        text: &str,
    ) -> Result<(), ApplicationError>;

    /// The newest `limit` non-blank entries, oldest first.
    async fn recent(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> Result<Vec<TranscriptEntry>, ApplicationError>;
}
