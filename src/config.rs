//! Engine configuration.
//!
//! Values are layered, highest priority first: CLI overrides, `BILLING_*`
//! environment variables, a TOML file, built-in defaults.

use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

pub const ENV_DEFAULT_PRINCIPAL: &str = "BILLING_DEFAULT_PRINCIPAL";
pub const ENV_DEFAULT_ANNUAL_RATE: &str = "BILLING_DEFAULT_ANNUAL_RATE";
pub const ENV_DEFAULT_DURATION_WEEKS: &str = "BILLING_DEFAULT_DURATION_WEEKS";
pub const ENV_DELINQUENCY_THRESHOLD: &str = "BILLING_DELINQUENCY_THRESHOLD";
pub const ENV_ABSORB_ROUNDING_RESIDUAL: &str = "BILLING_ABSORB_ROUNDING_RESIDUAL";
pub const ENV_LOG_LEVEL: &str = "BILLING_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Principal used when a creation request omits it.
    pub default_principal: Decimal,
    /// Flat annual rate used when a creation request omits it.
    pub default_annual_rate: Decimal,
    pub default_duration_weeks: u32,
    /// Consecutive missed installments that make a borrower delinquent.
    pub delinquency_threshold: u32,
    /// Let the final installment absorb the rounding residual of the weekly payment.
    pub absorb_rounding_residual: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_principal: dec!(5000000),
            default_annual_rate: dec!(0.10),
            default_duration_weeks: 50,
            delinquency_threshold: 2,
            absorb_rounding_residual: false,
            log_level: "info".to_string(),
        }
    }
}

/// Overrides supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub delinquency_threshold: Option<u32>,
}

impl BillingConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BillingError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BillingError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Applies every `BILLING_*` variable returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DEFAULT_PRINCIPAL) {
            self.default_principal = parse_var(ENV_DEFAULT_PRINCIPAL, &v)?;
        }
        if let Some(v) = lookup(ENV_DEFAULT_ANNUAL_RATE) {
            self.default_annual_rate = parse_var(ENV_DEFAULT_ANNUAL_RATE, &v)?;
        }
        if let Some(v) = lookup(ENV_DEFAULT_DURATION_WEEKS) {
            self.default_duration_weeks = parse_var(ENV_DEFAULT_DURATION_WEEKS, &v)?;
        }
        if let Some(v) = lookup(ENV_DELINQUENCY_THRESHOLD) {
            self.delinquency_threshold = parse_var(ENV_DELINQUENCY_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_ABSORB_ROUNDING_RESIDUAL) {
            self.absorb_rounding_residual = parse_var(ENV_ABSORB_ROUNDING_RESIDUAL, &v)?;
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL) {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn merge(&mut self, overrides: &ConfigOverrides) {
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        if let Some(threshold) = overrides.delinquency_threshold {
            self.delinquency_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_principal <= Decimal::ZERO {
            return Err(BillingError::ConfigError(
                "default_principal must be positive".to_string(),
            ));
        }
        if self.default_annual_rate < Decimal::ZERO {
            return Err(BillingError::ConfigError(
                "default_annual_rate must not be negative".to_string(),
            ));
        }
        if self.default_duration_weeks == 0 {
            return Err(BillingError::ConfigError(
                "default_duration_weeks must be positive".to_string(),
            ));
        }
        if self.delinquency_threshold == 0 {
            return Err(BillingError::ConfigError(
                "delinquency_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BillingError::ConfigError(format!("Invalid value for {}: {}", name, value)))
}

/// Builds the effective configuration from all sources.
pub fn build_config(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<BillingConfig> {
    let mut config = match file {
        Some(path) => BillingConfig::from_file(path)?,
        None => BillingConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.merge(overrides);
    config.validate()?;
    Ok(config)
}
