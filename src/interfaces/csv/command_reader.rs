use crate::domain::loan::LoanRequest;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Create,
    Payment,
}

/// One row of a billing command file.
///
/// `amount` is the principal for `create` rows and the paid amount for
/// `payment` rows. `rate` and `weeks` only apply to `create`. When `date` is
/// set the row is processed as of that day.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct BillingCommand {
    pub r#type: CommandType,
    pub loan: String,
    pub amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub weeks: Option<u32>,
    pub date: Option<NaiveDate>,
}

impl BillingCommand {
    pub fn loan_request(&self) -> LoanRequest {
        LoanRequest {
            loan_id: self.loan.clone(),
            principal: self.amount,
            annual_rate: self.rate,
            duration_weeks: self.weeks,
        }
    }

    /// The amount of a `payment` row, which is mandatory.
    pub fn payment_amount(&self) -> Result<Decimal> {
        self.amount.ok_or_else(|| {
            BillingError::ValidationError(format!("Payment for loan {} has no amount", self.loan))
        })
    }
}

/// Reads billing commands from a CSV source.
///
/// Whitespace is trimmed and short records are accepted, missing trailing
/// columns read as empty.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes commands, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<BillingCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
