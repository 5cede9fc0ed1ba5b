use super::money::Money;
use crate::config::BillingConfig;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Closed,
    Default,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Active => write!(f, "active"),
            LoanStatus::Closed => write!(f, "closed"),
            LoanStatus::Default => write!(f, "default"),
        }
    }
}

/// Longest accepted term, roughly one hundred years.
pub const MAX_DURATION_WEEKS: u32 = 5_200;

/// Validated terms of a fixed-installment loan.
///
/// The total owed and the weekly payment are computed once, on validation,
/// so an accepted set of terms never overflows later arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub principal: Money,
    /// Flat annual interest as a fraction (0.10 = 10%).
    pub annual_rate: Decimal,
    pub duration_weeks: u32,
    total_owed: Money,
    weekly_payment: Money,
}

/// Principal plus flat interest, or a validation error when it does not fit.
fn flat_total(principal: Money, annual_rate: Decimal) -> Result<Money> {
    principal
        .checked_mul(annual_rate)
        .and_then(|interest| principal.checked_add(interest))
        .ok_or_else(|| {
            BillingError::ValidationError(format!(
                "Total owed on principal {} at rate {} is too large",
                principal, annual_rate
            ))
        })
}

impl LoanTerms {
    pub fn new(principal: Money, annual_rate: Decimal, duration_weeks: u32) -> Result<Self> {
        if !principal.is_positive() {
            return Err(BillingError::ValidationError(
                "Principal must be positive".to_string(),
            ));
        }
        if annual_rate < Decimal::ZERO {
            return Err(BillingError::ValidationError(
                "Annual rate must not be negative".to_string(),
            ));
        }
        if duration_weeks == 0 {
            return Err(BillingError::ValidationError(
                "Duration must be at least one week".to_string(),
            ));
        }
        if duration_weeks > MAX_DURATION_WEEKS {
            return Err(BillingError::ValidationError(format!(
                "Duration must not exceed {} weeks",
                MAX_DURATION_WEEKS
            )));
        }

        let total_owed = flat_total(principal, annual_rate)?;
        let weekly_payment =
            Money::new(total_owed.value() / Decimal::from(duration_weeks)).round_cents();
        // Rounding up every installment may push the schedule past the total.
        if weekly_payment
            .checked_mul(Decimal::from(duration_weeks))
            .is_none()
        {
            return Err(BillingError::ValidationError(format!(
                "Weekly payment {} over {} weeks is too large",
                weekly_payment, duration_weeks
            )));
        }

        Ok(Self {
            principal,
            annual_rate,
            duration_weeks,
            total_owed,
            weekly_payment,
        })
    }

    /// Principal plus flat interest over the whole term.
    pub fn total_owed(&self) -> Money {
        self.total_owed
    }

    /// `round2((principal + principal * rate) / weeks)`.
    pub fn weekly_payment(&self) -> Money {
        self.weekly_payment
    }
}

/// A loan creation request as received from a caller.
///
/// Omitted terms fall back to the configured defaults. An explicit value,
/// including zero, is always kept and validated as given.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LoanRequest {
    pub loan_id: String,
    pub principal: Option<Decimal>,
    pub annual_rate: Option<Decimal>,
    pub duration_weeks: Option<u32>,
}

impl LoanRequest {
    pub fn new(loan_id: impl Into<String>) -> Self {
        Self {
            loan_id: loan_id.into(),
            ..Self::default()
        }
    }

    pub fn principal(mut self, principal: Decimal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn annual_rate(mut self, annual_rate: Decimal) -> Self {
        self.annual_rate = Some(annual_rate);
        self
    }

    pub fn duration_weeks(mut self, duration_weeks: u32) -> Self {
        self.duration_weeks = Some(duration_weeks);
        self
    }

    pub fn resolve(&self, config: &BillingConfig) -> Result<LoanTerms> {
        if self.loan_id.trim().is_empty() {
            return Err(BillingError::ValidationError(
                "Loan ID is required".to_string(),
            ));
        }
        if self.loan_id.chars().any(char::is_control) {
            return Err(BillingError::ValidationError(
                "Loan ID must not contain control characters".to_string(),
            ));
        }
        LoanTerms::new(
            Money::new(self.principal.unwrap_or(config.default_principal)),
            self.annual_rate.unwrap_or(config.default_annual_rate),
            self.duration_weeks.unwrap_or(config.default_duration_weeks),
        )
    }
}

/// A borrower's loan.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Loan {
    pub id: Uuid,
    /// Externally supplied, unique, human-readable identifier.
    pub loan_id: String,
    pub principal: Money,
    pub annual_rate: Decimal,
    pub duration_weeks: u32,
    pub weekly_payment: Money,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn new(loan_id: impl Into<String>, terms: &LoanTerms, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: loan_id.into(),
            principal: terms.principal,
            annual_rate: terms.annual_rate,
            duration_weeks: terms.duration_weeks,
            weekly_payment: terms.weekly_payment(),
            status: LoanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_owed(&self) -> Result<Money> {
        flat_total(self.principal, self.annual_rate)
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Marks the loan as fully repaid.
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.status = LoanStatus::Closed;
        self.updated_at = now;
    }
}
