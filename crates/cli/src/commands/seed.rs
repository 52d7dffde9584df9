use parley_db::{DbPool, DemoSeed, SeedResult};

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

pub fn run(clean: bool) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let outcome = seed(&pool, clean).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded, clean)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn seed(pool: &DbPool, clean: bool) -> Result<SeedResult, StepFailure> {
    if clean {
        DemoSeed::clean(pool).await.map_err(|error| ("seed_clean", error.to_string(), 5u8))?;
    }

    let seeded =
        DemoSeed::load(pool).await.map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    // Stock only has to match the fixture right after a clean load.
    let verification = DemoSeed::verify(pool, clean)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

    if verification.all_present {
        return Ok(seeded);
    }
    let failed = verification
        .checks
        .iter()
        .filter(|(_, passed)| !passed)
        .map(|(check, _)| check.as_str())
        .collect::<Vec<_>>();
    Err(("seed_verification", verification_message(&failed), 6u8))
}

fn summary(seeded: &SeedResult, clean: bool) -> String {
    format!(
        "demo world {}: {} entities, {} catalog items, {} stock lines",
        if clean { "reset and seeded" } else { "seeded" },
        seeded.entities,
        seeded.catalog_items,
        seeded.stock_lines
    )
}

fn verification_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed.join(", "))
    }
}
