use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use invoicer_core::domain::customer::{Customer, CustomerId};
use invoicer_core::domain::invoice::{AmountInCents, Invoice, InvoiceId, InvoiceInput};

pub mod customer;
pub mod invoice;
pub mod memory;

pub use customer::SqlCustomerRepository;
pub use invoice::SqlInvoiceRepository;
pub use memory::InMemoryDashboardRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// Invoice joined with the customer it bills, as shown in the listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceRow {
    pub invoice: Invoice,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_image_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoicePage {
    pub rows: Vec<InvoiceRow>,
    pub page: u32,
    pub total_matches: u64,
    pub total_pages: u32,
}

impl InvoicePage {
    pub(crate) fn assemble(rows: Vec<InvoiceRow>, page: u32, page_size: u32, total: u64) -> Self {
        let page_size = u64::from(page_size.max(1));
        let total_pages = u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX);
        Self { rows, page, total_matches: total, total_pages }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceSummary {
    pub invoice_count: u64,
    pub customer_count: u64,
    pub total_paid: AmountInCents,
    pub total_pending: AmountInCents,
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError>;

    async fn insert(&self, invoice: &Invoice) -> Result<(), RepositoryError>;

    /// Rewrites customer, amount and status. Returns the number of rows touched.
    async fn update(&self, id: &InvoiceId, input: &InvoiceInput) -> Result<u64, RepositoryError>;

    async fn delete(&self, id: &InvoiceId) -> Result<u64, RepositoryError>;

    /// Case-insensitive match on customer name/email, amount, date and status,
    /// newest first. `page` is 1-based.
    async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<InvoicePage, RepositoryError>;

    async fn summary(&self) -> Result<InvoiceSummary, RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError>;

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
}
