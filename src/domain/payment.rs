use super::loan::Loan;
use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A payment applied against one installment. Immutable once recorded.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub loan_id: String,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    /// Week of the installment this payment settled.
    pub week_number: u32,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        loan_id: impl Into<String>,
        amount: Money,
        week_number: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: loan_id.into(),
            amount,
            paid_at: now,
            week_number,
            created_at: now,
        }
    }
}

/// The writes that make up one accepted payment.
///
/// Stores apply a settlement as a single unit: the payment is recorded, its
/// installment is marked paid and, when present, the updated loan is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub payment: Payment,
    pub closed_loan: Option<Loan>,
}

/// Result of an accepted payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub outstanding: Money,
    pub delinquent: bool,
}
