use std::collections::HashMap;

use tokio::sync::RwLock;

use invoicer_core::domain::customer::{Customer, CustomerId};
use invoicer_core::domain::invoice::{AmountInCents, Invoice, InvoiceId, InvoiceInput, InvoiceStatus};

use super::{
    CustomerRepository, InvoicePage, InvoiceRepository, InvoiceRow, InvoiceSummary,
    RepositoryError,
};

/// Customers and invoices held in process memory. Enforces the same
/// customer reference rule as the SQL schema.
#[derive(Default)]
pub struct InMemoryDashboardRepository {
    customers: RwLock<HashMap<String, Customer>>,
    invoices: RwLock<HashMap<String, Invoice>>,
}

impl InMemoryDashboardRepository {
    pub fn with_customers(customers: impl IntoIterator<Item = Customer>) -> Self {
        let customers = customers.into_iter().map(|customer| (customer.id.0.clone(), customer));
        Self { customers: RwLock::new(customers.collect()), invoices: RwLock::default() }
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id.0.clone(), customer);
    }

    pub async fn invoice_count(&self) -> usize {
        self.invoices.read().await.len()
    }

    async fn ensure_customer(&self, id: &CustomerId) -> Result<(), RepositoryError> {
        if self.customers.read().await.contains_key(&id.0) {
            Ok(())
        } else {
            Err(RepositoryError::Constraint(format!("unknown customer `{}`", id.0)))
        }
    }
}

fn matches(row: &InvoiceRow, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let invoice = &row.invoice;
    [
        row.customer_name.to_lowercase(),
        row.customer_email.to_lowercase(),
        invoice.amount.0.to_string(),
        invoice.date.format("%Y-%m-%d").to_string(),
        invoice.status.as_str().to_string(),
    ]
    .iter()
    .any(|haystack| haystack.contains(needle))
}

#[async_trait::async_trait]
impl InvoiceRepository for InMemoryDashboardRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        Ok(self.invoices.read().await.get(&id.0).cloned())
    }

    async fn insert(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        self.ensure_customer(&invoice.customer_id).await?;
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&invoice.id.0) {
            return Err(RepositoryError::Constraint(format!(
                "duplicate invoice id `{}`",
                invoice.id.0
            )));
        }
        invoices.insert(invoice.id.0.clone(), invoice.clone());
        Ok(())
    }

    async fn update(&self, id: &InvoiceId, input: &InvoiceInput) -> Result<u64, RepositoryError> {
        self.ensure_customer(&input.customer_id).await?;
        let mut invoices = self.invoices.write().await;
        match invoices.get_mut(&id.0) {
            Some(invoice) => {
                invoice.apply(input.clone());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: &InvoiceId) -> Result<u64, RepositoryError> {
        Ok(u64::from(self.invoices.write().await.remove(&id.0).is_some()))
    }

    async fn search(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<InvoicePage, RepositoryError> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let needle = query.trim().to_lowercase();

        let customers = self.customers.read().await;
        let invoices = self.invoices.read().await;
        let mut rows: Vec<InvoiceRow> = invoices
            .values()
            .filter_map(|invoice| {
                let customer = customers.get(&invoice.customer_id.0)?;
                Some(InvoiceRow {
                    invoice: invoice.clone(),
                    customer_name: customer.name.clone(),
                    customer_email: customer.email.clone(),
                    customer_image_url: customer.image_url.clone(),
                })
            })
            .filter(|row| matches(row, &needle))
            .collect();
        rows.sort_by(|a, b| {
            b.invoice.date.cmp(&a.invoice.date).then_with(|| a.invoice.id.0.cmp(&b.invoice.id.0))
        });

        let total = rows.len() as u64;
        let offset = (page as usize - 1).saturating_mul(page_size as usize);
        let rows = rows.into_iter().skip(offset).take(page_size as usize).collect();
        Ok(InvoicePage::assemble(rows, page, page_size, total))
    }

    async fn summary(&self) -> Result<InvoiceSummary, RepositoryError> {
        let invoices = self.invoices.read().await;
        let total_for = |status: InvoiceStatus| {
            AmountInCents(
                invoices
                    .values()
                    .filter(|invoice| invoice.status == status)
                    .fold(0i64, |total, invoice| total.saturating_add(invoice.amount.0)),
            )
        };

        Ok(InvoiceSummary {
            invoice_count: invoices.len() as u64,
            customer_count: self.customers.read().await.len() as u64,
            total_paid: total_for(InvoiceStatus::Paid),
            total_pending: total_for(InvoiceStatus::Pending),
        })
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryDashboardRepository {
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let mut customers: Vec<Customer> = self.customers.read().await.values().cloned().collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customers)
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers.read().await.get(&id.0).cloned())
    }
}
