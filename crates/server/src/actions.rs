//! Invoice mutation handlers.
//!
//! Each handler runs `validate -> write -> revalidate -> navigate` in that
//! order and talks to storage through a single statement. Framework state
//! (repository, cache invalidation hook, clock) arrives in [`ActionContext`]
//! so the handlers stay independent of axum.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use invoicer_core::config::{DashboardConfig, DataErrorPolicy};
use invoicer_core::domain::invoice::{Invoice, InvoiceId, InvoiceInput};
use invoicer_core::errors::{ApplicationError, DomainError};
use invoicer_core::validation::{
    parse_invoice_form, validate_invoice_form, FieldErrors, ValidationError, ValidationMode,
};
use invoicer_core::FormData;
use invoicer_db::{InvoiceRepository, RepositoryError};

pub const CREATE_MISSING_FIELDS: &str = "Missing Fields. Failed to Create Invoice.";
pub const UPDATE_MISSING_FIELDS: &str = "Missing Fields. Failed to Update Invoice.";
pub const CREATE_DATABASE_ERROR: &str = "Database Error: Failed to Create Invoice.";
pub const UPDATE_DATABASE_ERROR: &str = "Database Error: Failed to Update Invoice.";
pub const DELETE_DATABASE_ERROR: &str = "Database Error: Failed to Delete Invoice.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSettings {
    pub invoices_path: String,
    pub validation_mode: ValidationMode,
    pub data_errors: DataErrorPolicy,
}

impl From<&DashboardConfig> for ActionSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            invoices_path: config.invoices_path.clone(),
            validation_mode: config.validation_mode,
            data_errors: config.data_errors,
        }
    }
}

pub struct ActionContext<'a> {
    pub repository: &'a dyn InvoiceRepository,
    pub revalidate: &'a (dyn Fn(&str) + Send + Sync),
    pub today: NaiveDate,
    pub settings: &'a ActionSettings,
}

/// What a form sees after a rejected submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActionState {
    pub errors: FieldErrors,
    pub message: Option<String>,
}

impl ActionState {
    fn failed(message: &str) -> Self {
        Self { errors: FieldErrors::default(), message: Some(message.to_string()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Navigate to the given path. Nothing runs after this.
    Redirect(String),
    /// Cache invalidated, caller stays where it is.
    Revalidated,
    Rejected(ActionState),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invoice write failed: {0}")]
    Persistence(#[source] RepositoryError),
}

impl From<ActionError> for ApplicationError {
    fn from(error: ActionError) -> Self {
        match error {
            ActionError::Validation(error) => DomainError::from(error).into(),
            ActionError::Persistence(error) => Self::Persistence(error.to_string()),
        }
    }
}

/// `_previous` is the state a progressively enhanced form posts back; it is
/// not consulted.
pub async fn create_invoice(
    ctx: &ActionContext<'_>,
    _previous: &ActionState,
    form: &FormData,
) -> Result<ActionOutcome, ActionError> {
    let input = match checked_input(ctx.settings, form, CREATE_MISSING_FIELDS)? {
        Ok(input) => input,
        Err(state) => return Ok(ActionOutcome::Rejected(state)),
    };

    let invoice = Invoice::create(input, ctx.today);
    if let Err(error) = ctx.repository.insert(&invoice).await {
        return write_failed(ctx.settings, error, "create", CREATE_DATABASE_ERROR, None);
    }

    info!(
        event_name = "dashboard.invoice.created",
        correlation_id = %invoice.id.0,
        invoice_id = %invoice.id.0,
        amount_cents = invoice.amount.0,
        status = invoice.status.as_str(),
        "invoice created"
    );
    Ok(navigate_to_listing(ctx))
}

pub async fn update_invoice(
    ctx: &ActionContext<'_>,
    id: &InvoiceId,
    _previous: &ActionState,
    form: &FormData,
) -> Result<ActionOutcome, ActionError> {
    let input = match checked_input(ctx.settings, form, UPDATE_MISSING_FIELDS)? {
        Ok(input) => input,
        Err(state) => return Ok(ActionOutcome::Rejected(state)),
    };

    let touched = match ctx.repository.update(id, &input).await {
        Ok(touched) => touched,
        Err(error) => {
            return write_failed(ctx.settings, error, "update", UPDATE_DATABASE_ERROR, Some(id))
        }
    };

    info!(
        event_name = "dashboard.invoice.updated",
        correlation_id = %id.0,
        invoice_id = %id.0,
        rows_affected = touched,
        "invoice updated"
    );
    Ok(navigate_to_listing(ctx))
}

pub async fn delete_invoice(
    ctx: &ActionContext<'_>,
    id: &InvoiceId,
) -> Result<ActionOutcome, ActionError> {
    let touched = match ctx.repository.delete(id).await {
        Ok(touched) => touched,
        Err(error) => {
            return write_failed(ctx.settings, error, "delete", DELETE_DATABASE_ERROR, Some(id))
        }
    };

    info!(
        event_name = "dashboard.invoice.deleted",
        correlation_id = %id.0,
        invoice_id = %id.0,
        rows_affected = touched,
        "invoice deleted"
    );
    (ctx.revalidate)(&ctx.settings.invoices_path);
    Ok(ActionOutcome::Revalidated)
}

/// Outer error aborts the request, inner error goes back to the form.
fn checked_input(
    settings: &ActionSettings,
    form: &FormData,
    message: &str,
) -> Result<Result<InvoiceInput, ActionState>, ActionError> {
    match settings.validation_mode {
        ValidationMode::Report => Ok(validate_invoice_form(form)
            .map_err(|errors| ActionState { errors, message: Some(message.to_string()) })),
        ValidationMode::Throw => Ok(Ok(parse_invoice_form(form)?)),
    }
}

fn navigate_to_listing(ctx: &ActionContext<'_>) -> ActionOutcome {
    (ctx.revalidate)(&ctx.settings.invoices_path);
    ActionOutcome::Redirect(ctx.settings.invoices_path.clone())
}

fn write_failed(
    settings: &ActionSettings,
    error: RepositoryError,
    operation: &'static str,
    message: &str,
    id: Option<&InvoiceId>,
) -> Result<ActionOutcome, ActionError> {
    match settings.data_errors {
        DataErrorPolicy::Report => {
            error!(
                event_name = "dashboard.invoice.write_failed",
                correlation_id = id.map_or("new", |id| id.0.as_str()),
                operation,
                error = %error,
                "invoice write failed"
            );
            Ok(ActionOutcome::Rejected(ActionState::failed(message)))
        }
        DataErrorPolicy::Propagate => Err(ActionError::Persistence(error)),
    }
}
