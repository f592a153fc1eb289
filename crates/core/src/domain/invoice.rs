use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

impl InvoiceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 2] = [InvoiceStatus::Pending, InvoiceStatus::Paid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported invoice status `{other}` (expected pending|paid)"
            ))),
        }
    }
}

/// Monetary amount held in minor currency units (cents).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AmountInCents(pub i64);

impl AmountInCents {
    pub fn display(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}${}.{:02}", abs / 100, abs % 100)
    }

    /// Major units with two decimals, as typed into the amount field.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub amount: AmountInCents,
    pub status: InvoiceStatus,
    pub date: NaiveDate,
}

/// Validated customer/amount/status triple submitted through an invoice form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceInput {
    pub customer_id: CustomerId,
    pub amount: AmountInCents,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn create(input: InvoiceInput, today: NaiveDate) -> Self {
        Self {
            id: InvoiceId::generate(),
            customer_id: input.customer_id,
            amount: input.amount,
            status: input.status,
            date: today,
        }
    }

    /// Applies an edit. Identifier and creation date never change.
    pub fn apply(&mut self, input: InvoiceInput) {
        self.customer_id = input.customer_id;
        self.amount = input.amount;
        self.status = input.status;
    }
}
