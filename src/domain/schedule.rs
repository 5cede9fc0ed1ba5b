use super::loan::Loan;
use super::money::Money;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Days between two consecutive installments.
pub const DAYS_PER_WEEK: u64 = 7;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    /// Set only by an external sweep; otherwise equivalent to `Pending`.
    Overdue,
}

impl InstallmentStatus {
    pub fn is_unpaid(&self) -> bool {
        matches!(self, InstallmentStatus::Pending | InstallmentStatus::Overdue)
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallmentStatus::Pending => write!(f, "pending"),
            InstallmentStatus::Paid => write!(f, "paid"),
            InstallmentStatus::Overdue => write!(f, "overdue"),
        }
    }
}

/// One weekly due amount within a loan's schedule.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Installment {
    pub id: Uuid,
    pub loan_id: String,
    /// 1-based, unique per loan.
    pub week_number: u32,
    pub due_amount: Money,
    pub due_date: NaiveDate,
    pub status: InstallmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Due date of `week_number`, counted in whole weeks from the loan's creation day.
///
/// `None` when the date is past the last representable calendar day.
pub fn due_date(created_at: DateTime<Utc>, week_number: u32) -> Option<NaiveDate> {
    created_at
        .date_naive()
        .checked_add_days(Days::new(DAYS_PER_WEEK * u64::from(week_number)))
}

/// Builds the full repayment schedule for a freshly created loan.
///
/// Every installment is due `weekly_payment`. When `absorb_residual` is set,
/// the final installment instead carries whatever is left of the total owed,
/// so the schedule sums exactly to principal plus interest.
pub fn build_schedule(loan: &Loan, absorb_residual: bool) -> Result<Vec<Installment>> {
    let weeks = loan.duration_weeks;
    let final_amount = if absorb_residual {
        loan.total_owed()? - loan.weekly_payment * Decimal::from(weeks - 1)
    } else {
        loan.weekly_payment
    };

    (1..=weeks)
        .map(|week_number| {
            let due_date = due_date(loan.created_at, week_number).ok_or_else(|| {
                BillingError::ValidationError(format!(
                    "Week {} of loan {} falls past the last representable date",
                    week_number, loan.loan_id
                ))
            })?;
            Ok(Installment {
                id: Uuid::new_v4(),
                loan_id: loan.loan_id.clone(),
                week_number,
                due_amount: if week_number == weeks {
                    final_amount
                } else {
                    loan.weekly_payment
                },
                due_date,
                status: InstallmentStatus::Pending,
                created_at: loan.created_at,
            })
        })
        .collect()
}

/// The lowest-numbered installment still awaiting payment.
pub fn earliest_unpaid(schedule: &[Installment]) -> Option<&Installment> {
    schedule
        .iter()
        .filter(|i| i.status.is_unpaid())
        .min_by_key(|i| i.week_number)
}

/// True when no installment other than `week_number` is still unpaid.
pub fn settles_loan(schedule: &[Installment], week_number: u32) -> bool {
    schedule
        .iter()
        .filter(|i| i.week_number != week_number)
        .all(|i| !i.status.is_unpaid())
}

/// Unpaid installments due strictly before `today`, in week order.
pub fn past_due(schedule: &[Installment], today: NaiveDate) -> Vec<Installment> {
    let mut overdue: Vec<Installment> = schedule
        .iter()
        .filter(|i| i.status.is_unpaid() && i.due_date < today)
        .cloned()
        .collect();
    overdue.sort_by_key(|i| i.week_number);
    overdue
}

/// Walks installments in due-date order and reports whether `threshold`
/// consecutive past-due installments were missed.
///
/// Only installments due strictly before `today` are considered; the walk
/// stops at the first one due today or later. A paid installment resets the
/// streak.
pub fn is_delinquent(schedule: &[Installment], today: NaiveDate, threshold: u32) -> bool {
    let mut ordered: Vec<&Installment> = schedule.iter().collect();
    ordered.sort_by_key(|i| (i.due_date, i.week_number));

    let mut consecutive_missed = 0;
    for installment in ordered {
        if installment.due_date >= today {
            break;
        }
        if installment.status.is_unpaid() {
            consecutive_missed += 1;
            if consecutive_missed >= threshold {
                return true;
            }
        } else {
            consecutive_missed = 0;
        }
    }
    false
}
