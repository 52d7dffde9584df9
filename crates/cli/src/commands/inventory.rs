use parley_core::domain::entity::EntityId;
use parley_core::domain::item::Holding;
use parley_core::ledger::InventoryLedger;
use parley_db::SqlInventoryLedger;

use crate::commands::{load_config, open_database, runtime, CommandResult};

pub fn run(entity_id: &str) -> CommandResult {
    let entity_id = entity_id.trim();
    if entity_id.is_empty() {
        return CommandResult::failure("inventory", "invalid_argument", "entity id is empty", 2);
    }

    let config = match load_config("inventory") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("inventory") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let holdings = SqlInventoryLedger::new(pool.clone())
            .holdings(&EntityId::new(entity_id))
            .await
            .map_err(|error| ("ledger_read", error.to_string(), 6u8));
        pool.close().await;
        holdings
    });

    match result {
        Ok(holdings) if holdings.is_empty() => CommandResult::failure(
            "inventory",
            "not_found",
            format!("no inventory found for entity `{entity_id}`"),
            7,
        ),
        Ok(holdings) => CommandResult::success("inventory", render(entity_id, &holdings)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("inventory", error_class, message, exit_code)
        }
    }
}

fn render(entity_id: &str, holdings: &[Holding]) -> String {
    let mut lines = vec![format!("inventory of entity {entity_id}:")];
    lines.extend(holdings.iter().map(|holding| {
        format!("  - {} x{} @ {:.2} gold", holding.item, holding.quantity, holding.unit_price)
    }));
    lines.join("\n")
}
