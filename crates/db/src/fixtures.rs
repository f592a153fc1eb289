use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seed invoices that must exist after a load, with their expected status.
const SEED_INVOICES: &[(&str, &str)] = &[
    ("inv-seed-001", "pending"),
    ("inv-seed-002", "pending"),
    ("inv-seed-003", "paid"),
    ("inv-seed-004", "paid"),
    ("inv-seed-005", "pending"),
    ("inv-seed-006", "pending"),
    ("inv-seed-007", "pending"),
    ("inv-seed-008", "paid"),
    ("inv-seed-009", "paid"),
    ("inv-seed-010", "paid"),
    ("inv-seed-011", "paid"),
    ("inv-seed-012", "paid"),
    ("inv-seed-013", "paid"),
];

const SEED_CUSTOMER_IDS: &[&str] = &[
    "cust-seed-001",
    "cust-seed-002",
    "cust-seed-003",
    "cust-seed-004",
    "cust-seed-005",
    "cust-seed-006",
];

/// Deterministic customers and invoices for local development and tests.
pub struct DashboardSeedDataset;

impl DashboardSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/dashboard_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            customers_seeded: SEED_CUSTOMER_IDS.len(),
            invoices_seeded: SEED_INVOICES.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_customers = sql_array_from_ids(SEED_CUSTOMER_IDS);
        let customer_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM customers WHERE id IN {quoted_customers}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("seed-customers", customer_count == SEED_CUSTOMER_IDS.len() as i64));

        for (invoice_id, status) in SEED_INVOICES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM invoices WHERE id = ?1 AND status = ?2)",
            )
            .bind(invoice_id)
            .bind(status)
            .fetch_one(pool)
            .await?;
            checks.push((*invoice_id, present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows, leaving anything else in place.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let ids: Vec<&str> = SEED_INVOICES.iter().map(|(id, _)| *id).collect();
        let quoted_invoices = sql_array_from_ids(&ids);
        let quoted_customers = sql_array_from_ids(SEED_CUSTOMER_IDS);

        sqlx::query(&format!("DELETE FROM invoices WHERE id IN {quoted_invoices}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM customers WHERE id IN {quoted_customers}
             AND id NOT IN (SELECT customer_id FROM invoices)"
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub customers_seeded: usize,
    pub invoices_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let pool = migrated_pool().await;

        let first = DashboardSeedDataset::load(&pool).await.expect("load seed");
        let first_verification = DashboardSeedDataset::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present);

        let second = DashboardSeedDataset::load(&pool).await.expect("reload seed");
        let second_verification = DashboardSeedDataset::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(first, second);
        assert_eq!(first_verification.checks, second_verification.checks);

        let invoice_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM invoices")
            .fetch_one(&pool)
            .await
            .expect("count invoices");
        assert_eq!(invoice_count, SEED_INVOICES.len() as i64);
    }

    #[tokio::test]
    async fn verify_fails_on_empty_database_and_after_clean() {
        let pool = migrated_pool().await;
        assert!(!DashboardSeedDataset::verify(&pool).await.expect("verify").all_present);

        DashboardSeedDataset::load(&pool).await.expect("load seed");
        DashboardSeedDataset::clean(&pool).await.expect("clean seed");

        let verification = DashboardSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }
}
