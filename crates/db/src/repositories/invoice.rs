use chrono::NaiveDate;
use sqlx::Row;

use invoicer_core::domain::customer::CustomerId;
use invoicer_core::domain::invoice::{
    AmountInCents, Invoice, InvoiceId, InvoiceInput, InvoiceStatus,
};

use super::{InvoicePage, InvoiceRepository, InvoiceRow, InvoiceSummary, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SEARCH_FILTER: &str = "customers.name LIKE ?1 ESCAPE '\\'
        OR customers.email LIKE ?1 ESCAPE '\\'
        OR CAST(invoices.amount AS TEXT) LIKE ?1 ESCAPE '\\'
        OR invoices.date LIKE ?1 ESCAPE '\\'
        OR invoices.status LIKE ?1 ESCAPE '\\'";

pub struct SqlInvoiceRepository {
    pool: DbPool,
}

impl SqlInvoiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(error: impl ToString) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn constraint_or_database(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db)
            if matches!(
                db.kind(),
                sqlx::error::ErrorKind::ForeignKeyViolation | sqlx::error::ErrorKind::CheckViolation
            ) =>
        {
            RepositoryError::Constraint(db.message().to_string())
        }
        _ => RepositoryError::Database(error),
    }
}

/// Wraps the term in `%` after escaping LIKE wildcards, so it matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.trim().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

// TOTAL() sums in floating point and never overflows; the cast saturates.
fn cents_from_total(total: f64) -> AmountInCents {
    AmountInCents(total.round() as i64)
}

fn row_to_invoice(row: &sqlx::sqlite::SqliteRow) -> Result<Invoice, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let customer_id: String = row.try_get("customer_id").map_err(decode)?;
    let amount: i64 = row.try_get("amount").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let date: String = row.try_get("date").map_err(decode)?;

    Ok(Invoice {
        id: InvoiceId(id),
        customer_id: CustomerId(customer_id),
        amount: AmountInCents(amount),
        status: status.parse::<InvoiceStatus>().map_err(decode)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(decode)?,
    })
}

fn row_to_listing(row: &sqlx::sqlite::SqliteRow) -> Result<InvoiceRow, RepositoryError> {
    Ok(InvoiceRow {
        invoice: row_to_invoice(row)?,
        customer_name: row.try_get("name").map_err(decode)?,
        customer_email: row.try_get("email").map_err(decode)?,
        customer_image_url: row.try_get("image_url").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl InvoiceRepository for SqlInvoiceRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, amount, status, date FROM invoices WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_invoice).transpose()
    }

    async fn insert(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO invoices (id, customer_id, amount, status, date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&invoice.id.0)
        .bind(&invoice.customer_id.0)
        .bind(invoice.amount.0)
        .bind(invoice.status.as_str())
        .bind(invoice.date.format(DATE_FORMAT).to_string())
        .execute(&self.pool)
        .await
        .map_err(constraint_or_database)?;

        Ok(())
    }

    async fn update(&self, id: &InvoiceId, input: &InvoiceInput) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoices SET customer_id = ?, amount = ?, status = ? WHERE id = ?",
        )
        .bind(&input.customer_id.0)
        .bind(input.amount.0)
        .bind(input.status.as_str())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(constraint_or_database)?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &InvoiceId) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM invoices WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<InvoicePage, RepositoryError> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let pattern = like_pattern(query);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT invoices.id, invoices.customer_id, invoices.amount, invoices.status,
                    invoices.date, customers.name, customers.email, customers.image_url
             FROM invoices
             JOIN customers ON invoices.customer_id = customers.id
             WHERE {SEARCH_FILTER}
             ORDER BY invoices.date DESC, invoices.id ASC
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(&pattern)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*)
             FROM invoices
             JOIN customers ON invoices.customer_id = customers.id
             WHERE {SEARCH_FILTER}"
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let rows = rows.iter().map(row_to_listing).collect::<Result<Vec<_>, _>>()?;
        Ok(InvoicePage::assemble(rows, page, page_size, u64::try_from(total).unwrap_or(0)))
    }

    async fn summary(&self) -> Result<InvoiceSummary, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM invoices) AS invoice_count,
                (SELECT COUNT(*) FROM customers) AS customer_count,
                (SELECT TOTAL(amount) FROM invoices WHERE status = 'paid') AS paid,
                (SELECT TOTAL(amount) FROM invoices WHERE status = 'pending') AS pending",
        )
        .fetch_one(&self.pool)
        .await?;

        let invoice_count: i64 = row.try_get("invoice_count").map_err(decode)?;
        let customer_count: i64 = row.try_get("customer_count").map_err(decode)?;
        let paid: f64 = row.try_get("paid").map_err(decode)?;
        let pending: f64 = row.try_get("pending").map_err(decode)?;

        Ok(InvoiceSummary {
            invoice_count: u64::try_from(invoice_count).unwrap_or(0),
            customer_count: u64::try_from(customer_count).unwrap_or(0),
            total_paid: cents_from_total(paid),
            total_pending: cents_from_total(pending),
        })
    }
}
