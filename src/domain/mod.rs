//! Domain layer: loan terms, repayment schedules, payments and the ports
//! through which they are stored.

pub mod clock;
pub mod loan;
pub mod money;
pub mod payment;
pub mod ports;
pub mod schedule;
