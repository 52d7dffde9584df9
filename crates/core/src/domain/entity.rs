use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    Player,
    Npc,
}

impl EntityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Npc => "npc",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub role: EntityRole,
    /// Free-form character description, e.g. "pirate merchant".
    pub persona: Option<String>,
}

/// Identifies one player/NPC conversation. Every piece of per-conversation
/// state (negotiation record, transcript) is keyed by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub player: EntityId,
    pub npc: EntityId,
}

impl ConversationKey {
    pub fn new(player: impl Into<String>, npc: impl Into<String>) -> Self {
        Self { player: EntityId::new(player), npc: EntityId::new(npc) }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.player, self.npc)
    }
}
