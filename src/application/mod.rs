//! Application layer containing the billing operations.
//!
//! This module defines the `BillingEngine`, the entry point for creating
//! loans, taking payments and querying balances and delinquency. Writes to a
//! single loan are serialized through a per-loan lock registry.

pub mod engine;
pub mod locks;
