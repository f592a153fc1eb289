use crate::commands::{prepare, CommandResult};
use invoicer_db::{connect, migrations, DashboardSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DashboardSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DashboardSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        pool.close().await;
        match verification_failure(&failed_checks) {
            Some(message) => Err(("seed_verification", message, 6u8)),
            None => Ok(seeded),
        }
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "dashboard seed dataset loaded: {} customers, {} invoices",
        seeded.customers_seeded, seeded.invoices_seeded
    )
}

fn verification_failure(failed_checks: &[&str]) -> Option<String> {
    (!failed_checks.is_empty())
        .then(|| format!("Seed verification failed for checks: {}", failed_checks.join(", ")))
}
