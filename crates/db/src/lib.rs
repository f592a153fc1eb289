pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DashboardSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    CustomerRepository, InMemoryDashboardRepository, InvoicePage, InvoiceRepository,
    InvoiceRow, InvoiceSummary, RepositoryError, SqlCustomerRepository, SqlInvoiceRepository,
};
