//! # Application Configuration
//!
//! Settings read once at startup from the environment.
//!
//! | Variable              | Default                   |
//! |-----------------------|---------------------------|
//! | `DAIRY_DB_PATH`       | `./dairy.db`              |
//! | `DAIRY_BUSINESS_NAME` | `DIARY MANAGEMENT SYSTEM` |
//! | `DAIRY_CURRENCY`      | `INR`                     |
//! | `DAIRY_OPERATOR`      | `admin`                   |
//!
//! Unparseable values fall back to the default.

use std::path::PathBuf;

use dairy_core::{Actor, Currency, ReceiptHeader, DEFAULT_CURRENCY};
use tracing::warn;

use crate::error::DbResult;
use crate::pool::DbConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub business_name: String,
    pub currency: Currency,
    /// Username stamped on records created by batch tools.
    pub operator: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("./dairy.db"),
            business_name: ReceiptHeader::default().business_name,
            currency: DEFAULT_CURRENCY,
            operator: "admin".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = AppConfig::default();

        if let Some(path) = lookup("DAIRY_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(name) = lookup("DAIRY_BUSINESS_NAME") {
            if !name.trim().is_empty() {
                config.business_name = name.trim().to_string();
            }
        }

        if let Some(code) = lookup("DAIRY_CURRENCY") {
            match code.parse::<Currency>() {
                Ok(currency) => config.currency = currency,
                Err(err) => warn!(value = %code, error = %err, "Ignoring DAIRY_CURRENCY"),
            }
        }

        if let Some(operator) = lookup("DAIRY_OPERATOR") {
            if !operator.trim().is_empty() {
                config.operator = operator.trim().to_string();
            }
        }

        config
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone())
    }

    pub fn receipt_header(&self) -> ReceiptHeader {
        ReceiptHeader {
            business_name: self.business_name.clone(),
            currency_prefix: self.currency.receipt_prefix().to_string(),
            ..ReceiptHeader::default()
        }
    }

    pub fn operator(&self) -> DbResult<Actor> {
        Ok(Actor::new(&self.operator)?)
    }
}
