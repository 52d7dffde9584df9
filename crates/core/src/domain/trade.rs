use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entity::{ConversationKey, EntityId};
use crate::domain::item::ItemKind;

/// Trade direction relative to the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
    NoTrade,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::NoTrade => "no_trade",
        }
    }
}

impl std::str::FromStr for TradeDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            "no_trade" | "none" => Ok(Self::NoTrade),
            other => Err(format!("unsupported trade direction `{other}`")),
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantity 0 marks a vague amount ("some rum") that still has to be resolved.
pub const VAGUE_QUANTITY: u32 = 0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub direction: TradeDirection,
    pub item: ItemKind,
    pub quantity: u32,
}

impl TradeIntent {
    pub fn is_vague(&self) -> bool {
        self.quantity == VAGUE_QUANTITY
    }

    pub fn is_trade(&self) -> bool {
        self.direction != TradeDirection::NoTrade
    }

    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self { quantity, ..self.clone() }
    }

    /// Buying moves stock NPC -> player, selling moves it player -> NPC.
    pub fn into_order(&self, key: &ConversationKey) -> Option<TransferOrder> {
        let (from, to) = match self.direction {
            TradeDirection::Buy => (key.npc.clone(), key.player.clone()),
            TradeDirection::Sell => (key.player.clone(), key.npc.clone()),
            TradeDirection::NoTrade => return None,
        };
        Some(TransferOrder { from, to, item: self.item.clone(), quantity: self.quantity })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentJudgment {
    Yes,
    No,
    Unsure,
}

impl std::str::FromStr for ConsentJudgment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "unsure" => Ok(Self::Unsure),
            other => Err(format!("unsupported consent judgment `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub from: EntityId,
    pub to: EntityId,
    pub item: ItemKind,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub order: TransferOrder,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl TransferReceipt {
    pub fn new(order: TransferOrder, unit_price: Decimal) -> Self {
        let total = unit_price * Decimal::from(order.quantity);
        Self { order, unit_price, total }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::entity::ConversationKey;
    use crate::domain::item::ItemKind;
    use crate::domain::trade::{TradeDirection, TradeIntent, TransferReceipt};

    fn intent(direction: TradeDirection) -> TradeIntent {
        TradeIntent { direction, item: ItemKind::new("rum"), quantity: 2 }
    }

    #[test]
    fn buy_moves_stock_from_npc_to_player() {
        let key = ConversationKey::new("player-2", "npc-1");
        let order = intent(TradeDirection::Buy).into_order(&key).expect("buy has an order");

        assert_eq!(order.from, key.npc);
        assert_eq!(order.to, key.player);
        assert_eq!(order.quantity, 2);
    }

    #[test]
    fn sell_moves_stock_from_player_to_npc() {
        let key = ConversationKey::new("player-2", "npc-1");
        let order = intent(TradeDirection::Sell).into_order(&key).expect("sell has an order");

        assert_eq!(order.from, key.player);
        assert_eq!(order.to, key.npc);
    }

    #[test]
    fn no_trade_has_no_order() {
        let key = ConversationKey::new("player-2", "npc-1");
        assert!(intent(TradeDirection::NoTrade).into_order(&key).is_none());
    }

    #[test]
    fn receipt_total_is_unit_price_times_quantity() {
        let key = ConversationKey::new("player-2", "npc-1");
        let order = intent(TradeDirection::Buy).into_order(&key).expect("order");
        let receipt = TransferReceipt::new(order, Decimal::new(350, 2));

        assert_eq!(receipt.total, Decimal::new(700, 2));
    }

    #[test]
    fn directions_parse_case_insensitively() {
        assert_eq!("BUY".parse::<TradeDirection>(), Ok(TradeDirection::Buy));
        assert_eq!(" sell ".parse::<TradeDirection>(), Ok(TradeDirection::Sell));
        assert_eq!("no_trade".parse::<TradeDirection>(), Ok(TradeDirection::NoTrade));
        assert!("barter".parse::<TradeDirection>().is_err());
    }
}
