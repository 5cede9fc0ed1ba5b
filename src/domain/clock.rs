use crate::error::{BillingError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};

/// Source of the current instant. All comparisons are made in UTC.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The current UTC calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

impl Clock for SafeTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        SafeTimeProvider::now(self)
    }
}

pub fn system_time() -> SafeTimeProvider {
    SafeTimeProvider::new(TimeSource::System)
}

/// A test-mode provider starting at midnight UTC of `day`.
pub fn test_time_on(day: NaiveDate) -> SafeTimeProvider {
    SafeTimeProvider::new(TimeSource::Test(midnight(day)))
}

pub fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Moves a test-mode provider to midnight UTC of `day`, backwards if need be.
pub fn move_to_day(time: &SafeTimeProvider, day: NaiveDate) -> Result<()> {
    let control = time.test_control().ok_or_else(|| {
        BillingError::ConfigError("the clock can only be moved in test mode".to_string())
    })?;
    control.advance(midnight(day) - time.now());
    Ok(())
}
