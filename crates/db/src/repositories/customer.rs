use sqlx::Row;

use invoicer_core::domain::customer::{Customer, CustomerId};

use super::{CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let decode = |error: sqlx::Error| RepositoryError::Decode(error.to_string());
    Ok(Customer {
        id: CustomerId(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        image_url: row.try_get("image_url").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, email, image_url FROM customers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_customer).collect()
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, image_url FROM customers WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }
}

#[cfg(test)]
mod tests {
    use invoicer_core::domain::customer::CustomerId;

    use super::SqlCustomerRepository;
    use crate::repositories::CustomerRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn list_orders_customers_by_name() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        for (id, name) in [("c-2", "Steph Dietz"), ("c-1", "Amy Burns")] {
            sqlx::query("INSERT INTO customers (id, name, email) VALUES (?, ?, 'x@example.com')")
                .bind(id)
                .bind(name)
                .execute(&pool)
                .await
                .expect("seed customer");
        }
        let repo = SqlCustomerRepository::new(pool);

        let names: Vec<String> =
            repo.list().await.expect("list").into_iter().map(|customer| customer.name).collect();
        assert_eq!(names, vec!["Amy Burns".to_string(), "Steph Dietz".to_string()]);

        let found = repo.find_by_id(&CustomerId("c-2".to_string())).await.expect("find");
        assert_eq!(found.map(|customer| customer.image_url), Some(String::new()));
        assert!(repo.find_by_id(&CustomerId("missing".to_string())).await.expect("find").is_none());
    }
}
