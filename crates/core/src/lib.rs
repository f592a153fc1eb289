pub mod authorization;
pub mod config;
pub mod domain;
pub mod errors;
pub mod form;
pub mod search;
pub mod validation;

pub use authorization::{AccessDecision, RouteGuard};
pub use domain::customer::{Customer, CustomerId};
pub use domain::invoice::{AmountInCents, Invoice, InvoiceId, InvoiceInput, InvoiceStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use form::FormData;
pub use search::{Debouncer, Location, Navigator, SearchBox, SearchParams, SearchState};
pub use validation::{FieldErrors, ValidationError, ValidationMode};
