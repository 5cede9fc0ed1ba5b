use crate::application::engine::BillingEngine;
use crate::domain::loan::{Loan, LoanStatus};
use crate::domain::money::Money;
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::io::Write;

fn display<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

/// End-of-run state of one loan.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct LoanSummary {
    pub loan: String,
    #[serde(serialize_with = "display")]
    pub principal: Money,
    #[serde(serialize_with = "display")]
    pub rate: Decimal,
    pub weeks: u32,
    #[serde(serialize_with = "display")]
    pub weekly_payment: Money,
    pub paid_weeks: usize,
    #[serde(serialize_with = "display")]
    pub outstanding: Money,
    pub delinquent: bool,
    pub status: LoanStatus,
}

impl LoanSummary {
    pub fn new(loan: &Loan, paid_weeks: usize, outstanding: Money, delinquent: bool) -> Self {
        Self {
            loan: loan.loan_id.clone(),
            principal: loan.principal,
            rate: loan.annual_rate.normalize(),
            weeks: loan.duration_weeks,
            weekly_payment: loan.weekly_payment,
            paid_weeks,
            outstanding,
            delinquent: delinquent && loan.is_active(),
            status: loan.status,
        }
    }
}

/// Summaries of every loan, ordered by loan id.
///
/// Loans that are no longer active are reported as not delinquent. Any other
/// failure aborts the summary.
pub async fn summarize(engine: &BillingEngine) -> Result<Vec<LoanSummary>> {
    let mut summaries = Vec::new();
    for loan in engine.loans().await? {
        let paid_weeks = engine.payments(&loan.loan_id).await?.len();
        let outstanding = engine.get_outstanding(&loan.loan_id).await?;
        let delinquent = match engine.is_delinquent(&loan.loan_id).await {
            Ok(delinquent) => delinquent,
            Err(BillingError::AlreadyClosed(_)) => false,
            Err(e) => return Err(e),
        };
        summaries.push(LoanSummary::new(&loan, paid_weeks, outstanding, delinquent));
    }
    Ok(summaries)
}

/// Writes loan summaries as CSV, header first.
pub struct LoanWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LoanWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_summaries<I>(&mut self, summaries: I) -> Result<()>
    where
        I: IntoIterator<Item = LoanSummary>,
    {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
