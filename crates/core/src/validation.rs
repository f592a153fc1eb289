//! Invoice form validation.
//!
//! A submission is checked field by field with small coercion and constraint
//! steps. Two call styles are offered:
//!
//! - [`validate_invoice_form`] collects every failure into [`FieldErrors`] so a
//!   form can be re-rendered with inline messages;
//! - [`parse_invoice_form`] stops at the first failure and returns it as a
//!   [`ValidationError`] for callers that abort the request instead.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::CustomerId;
use crate::domain::invoice::{AmountInCents, InvoiceInput, InvoiceStatus};
use crate::form::FormData;

pub const CUSTOMER_ID_FIELD: &str = "customerId";
pub const AMOUNT_FIELD: &str = "amount";
pub const STATUS_FIELD: &str = "status";

pub const CUSTOMER_REQUIRED: &str = "Please select a customer.";
pub const AMOUNT_NOT_POSITIVE: &str = "Please enter an amount greater than $0.";
pub const AMOUNT_NOT_A_NUMBER: &str = "Expected a number.";
pub const AMOUNT_TOO_LARGE: &str = "Please enter an amount of $100,000,000 or less.";

/// Largest accepted invoice amount, in cents.
pub const MAX_AMOUNT: AmountInCents = AmountInCents(10_000_000_000);
pub const STATUS_REQUIRED: &str = "Please select an invoice status.";

/// How a handler reacts to a failed validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Return field errors to the caller and keep serving the request.
    #[default]
    Report,
    /// Abort on the first failure.
    Throw,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "throw" => Ok(Self::Throw),
            other => Err(format!("unsupported validation mode `{other}` (expected report|throw)")),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error("invalid `{field}`: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Field name to messages, in the order the checks produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

pub fn validate_invoice_form(form: &FormData) -> Result<InvoiceInput, FieldErrors> {
    let customer = required_text(form.get(CUSTOMER_ID_FIELD), CUSTOMER_REQUIRED);
    let amount = coerce_amount(form.get(AMOUNT_FIELD))
        .and_then(greater_than_zero)
        .and_then(to_minor_units)
        .and_then(within_limit);
    let status = one_of(form.get(STATUS_FIELD), &InvoiceStatus::ALL, STATUS_REQUIRED);

    match (customer, amount, status) {
        (Ok(customer), Ok(amount), Ok(status)) => {
            Ok(InvoiceInput { customer_id: CustomerId(customer), amount, status })
        }
        (customer, amount, status) => {
            let mut errors = FieldErrors::default();
            if let Err(message) = customer {
                errors.push(CUSTOMER_ID_FIELD, message);
            }
            if let Err(message) = amount {
                errors.push(AMOUNT_FIELD, message);
            }
            if let Err(message) = status {
                errors.push(STATUS_FIELD, message);
            }
            Err(errors)
        }
    }
}

pub fn parse_invoice_form(form: &FormData) -> Result<InvoiceInput, ValidationError> {
    let customer = required_text(form.get(CUSTOMER_ID_FIELD), CUSTOMER_REQUIRED)
        .map_err(fail(CUSTOMER_ID_FIELD))?;
    let amount = coerce_amount(form.get(AMOUNT_FIELD))
        .and_then(greater_than_zero)
        .and_then(to_minor_units)
        .and_then(within_limit)
        .map_err(fail(AMOUNT_FIELD))?;
    let status = one_of(form.get(STATUS_FIELD), &InvoiceStatus::ALL, STATUS_REQUIRED)
        .map_err(fail(STATUS_FIELD))?;

    Ok(InvoiceInput { customer_id: CustomerId(customer), amount, status })
}

fn required_text(raw: Option<&str>, message: &'static str) -> Result<String, &'static str> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(message),
    }
}

// Missing or blank input coerces to zero, which the positivity step rejects.
fn coerce_amount(raw: Option<&str>) -> Result<Decimal, &'static str> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AMOUNT_NOT_A_NUMBER)
}

fn greater_than_zero(amount: Decimal) -> Result<Decimal, &'static str> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(AMOUNT_NOT_POSITIVE)
    }
}

fn to_minor_units(amount: Decimal) -> Result<AmountInCents, &'static str> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .map(AmountInCents)
        .ok_or(AMOUNT_TOO_LARGE)
}

fn within_limit(amount: AmountInCents) -> Result<AmountInCents, &'static str> {
    if amount <= MAX_AMOUNT {
        Ok(amount)
    } else {
        Err(AMOUNT_TOO_LARGE)
    }
}

fn one_of(
    raw: Option<&str>,
    allowed: &[InvoiceStatus],
    message: &'static str,
) -> Result<InvoiceStatus, &'static str> {
    let raw = raw.ok_or(message)?;
    allowed.iter().copied().find(|candidate| candidate.as_str() == raw).ok_or(message)
}

fn fail(field: &'static str) -> impl Fn(&'static str) -> ValidationError {
    move |message| ValidationError { field: field.to_string(), message: message.to_string() }
}

#[cfg(test)]
mod tests {
    use crate::domain::customer::CustomerId;
    use crate::domain::invoice::{AmountInCents, InvoiceStatus};
    use crate::form::FormData;

    use super::*;

    fn form(customer: &str, amount: &str, status: &str) -> FormData {
        FormData::new()
            .with(CUSTOMER_ID_FIELD, customer)
            .with(AMOUNT_FIELD, amount)
            .with(STATUS_FIELD, status)
    }

    #[test]
    fn valid_form_is_coerced_into_minor_units() {
        let input = validate_invoice_form(&form("cust-1", "157.95", "pending")).expect("valid");

        assert_eq!(input.customer_id, CustomerId("cust-1".to_string()));
        assert_eq!(input.amount, AmountInCents(15_795));
        assert_eq!(input.status, InvoiceStatus::Pending);
    }

    #[test]
    fn sub_cent_amounts_round_half_away_from_zero() {
        let up = validate_invoice_form(&form("c", "0.005", "paid")).expect("valid");
        let down = validate_invoice_form(&form("c", "10.004", "paid")).expect("valid");
        let scientific = validate_invoice_form(&form("c", "1e2", "paid")).expect("valid");

        assert_eq!(up.amount, AmountInCents(1));
        assert_eq!(down.amount, AmountInCents(1000));
        assert_eq!(scientific.amount, AmountInCents(10_000));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        for amount in ["0", "-4", "", "   ", "0.00"] {
            let errors = validate_invoice_form(&form("c", amount, "paid")).expect_err(amount);
            assert_eq!(errors.get(AMOUNT_FIELD), [AMOUNT_NOT_POSITIVE.to_string()]);
        }
    }

    #[test]
    fn missing_amount_coerces_to_zero() {
        let submission = FormData::new().with(CUSTOMER_ID_FIELD, "c").with(STATUS_FIELD, "paid");
        let errors = validate_invoice_form(&submission).expect_err("missing amount");

        assert_eq!(errors.get(AMOUNT_FIELD), [AMOUNT_NOT_POSITIVE.to_string()]);
    }

    #[test]
    fn non_numeric_amount_reports_type_error() {
        let errors = validate_invoice_form(&form("c", "twelve", "paid")).expect_err("nan");
        assert_eq!(errors.get(AMOUNT_FIELD), [AMOUNT_NOT_A_NUMBER.to_string()]);
    }

    #[test]
    fn amount_overflowing_minor_units_is_rejected() {
        let errors =
            validate_invoice_form(&form("c", "99999999999999999999", "paid")).expect_err("huge");
        assert_eq!(errors.get(AMOUNT_FIELD), [AMOUNT_TOO_LARGE.to_string()]);
    }

    #[test]
    fn amount_is_capped_at_one_hundred_million() {
        let at_cap = validate_invoice_form(&form("c", "100000000", "paid")).expect("at cap");
        assert_eq!(at_cap.amount, MAX_AMOUNT);

        for amount in ["100000000.01", "90000000000000000"] {
            let errors = validate_invoice_form(&form("c", amount, "paid")).expect_err(amount);
            assert_eq!(errors.get(AMOUNT_FIELD), [AMOUNT_TOO_LARGE.to_string()]);
        }

        let error = parse_invoice_form(&form("c", "90000000000000000", "paid")).expect_err("cap");
        assert_eq!(error.message, AMOUNT_TOO_LARGE);
    }

    #[test]
    fn unknown_status_is_rejected() {
        for status in ["", "overdue", "PAID"] {
            let errors = validate_invoice_form(&form("c", "10", status)).expect_err(status);
            assert_eq!(errors.get(STATUS_FIELD), [STATUS_REQUIRED.to_string()]);
        }
    }

    #[test]
    fn every_failing_field_is_reported() {
        let errors = validate_invoice_form(&FormData::new()).expect_err("empty form");

        assert_eq!(errors.fields().collect::<Vec<_>>(), vec![AMOUNT_FIELD, CUSTOMER_ID_FIELD, STATUS_FIELD]);
        assert_eq!(errors.get(CUSTOMER_ID_FIELD), [CUSTOMER_REQUIRED.to_string()]);
    }

    #[test]
    fn parse_stops_at_first_failure_in_field_order() {
        let error = parse_invoice_form(&form("", "-1", "nope")).expect_err("invalid");

        assert_eq!(error.field, CUSTOMER_ID_FIELD);
        assert_eq!(error.message, CUSTOMER_REQUIRED);

        let error = parse_invoice_form(&form("c", "-1", "nope")).expect_err("invalid");
        assert_eq!(error.field, AMOUNT_FIELD);
    }

    #[test]
    fn parse_and_validate_agree_on_valid_input() {
        let submission = form(" cust-9 ", "12", "paid");
        assert_eq!(
            parse_invoice_form(&submission).expect("parse"),
            validate_invoice_form(&submission).expect("validate")
        );
    }

    #[test]
    fn validation_mode_parses_from_config_strings() {
        assert_eq!("throw".parse::<ValidationMode>(), Ok(ValidationMode::Throw));
        assert_eq!(" Report ".parse::<ValidationMode>(), Ok(ValidationMode::Report));
        assert!("strict".parse::<ValidationMode>().is_err());
    }
}
