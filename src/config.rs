use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{LedgerError, Result};
use crate::types::Page;

/// environment variable naming the SQLite database file
pub const DATABASE_URL_ENV: &str = "LEDGER_DATABASE_URL";

/// environment variable switching interest-free quotes on
pub const ALLOW_INTEREST_FREE_ENV: &str = "LEDGER_ALLOW_INTEREST_FREE";

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub schedule: ScheduleConfig,
    pub limits: LoanLimits,
    pub storage: StorageConfig,
    pub default_page_limit: usize,
}

/// installment schedule configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// fixed length of one period, not calendar aware
    pub period_days: u32,
    /// accept a zero annual rate and split the principal evenly
    pub allow_interest_free: bool,
}

/// loan limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanLimits {
    pub max_term_months: u32,
}

/// where the ledger keeps its records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_days: 30,
            allow_interest_free: false,
        }
    }
}

impl Default for LoanLimits {
    fn default() -> Self {
        Self { max_term_months: 360 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::microcredit()
    }
}

impl LedgerConfig {
    /// standard microcredit book: 30-day periods, positive rates only
    pub fn microcredit() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            limits: LoanLimits::default(),
            storage: StorageConfig::Memory,
            default_page_limit: Page::DEFAULT_LIMIT,
        }
    }

    /// same book, but zero-rate loans are accepted
    pub fn interest_free() -> Self {
        let mut config = Self::microcredit();
        config.schedule.allow_interest_free = true;
        config
    }

    /// persist to a SQLite file instead of memory
    pub fn with_sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = StorageConfig::Sqlite { path: path.into() };
        self
    }

    /// parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// load the microcredit preset and overlay environment settings
    pub fn from_env() -> Result<Self> {
        let mut config = Self::microcredit();

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url).to_string();
            config.storage = StorageConfig::Sqlite { path: path.into() };
        }

        if let Ok(flag) = std::env::var(ALLOW_INTEREST_FREE_ENV) {
            config.schedule.allow_interest_free = parse_flag(&flag).ok_or_else(|| {
                LedgerError::InvalidConfiguration {
                    message: format!("{} must be true or false, got {:?}", ALLOW_INTEREST_FREE_ENV, flag),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.period_days == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "period_days must be greater than zero".to_string(),
            });
        }
        if self.limits.max_term_months == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "max_term_months must be greater than zero".to_string(),
            });
        }
        if self.default_page_limit == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "default_page_limit must be greater than zero".to_string(),
            });
        }
        if let StorageConfig::Sqlite { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(LedgerError::InvalidConfiguration {
                    message: "sqlite path is empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// first page using the configured default limit
    pub fn default_page(&self) -> Page {
        Page::new(0, self.default_page_limit)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microcredit_defaults() {
        let config = LedgerConfig::microcredit();
        assert_eq!(config.schedule.period_days, 30);
        assert!(!config.schedule.allow_interest_free);
        assert_eq!(config.limits.max_term_months, 360);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LedgerConfig::from_json_str(
            r#"{ "schedule": { "allow_interest_free": true }, "storage": { "kind": "sqlite", "path": "ledger.db" } }"#,
        )
        .unwrap();

        assert!(config.schedule.allow_interest_free);
        assert_eq!(config.schedule.period_days, 30);
        assert_eq!(config.storage, StorageConfig::Sqlite { path: "ledger.db".into() });
        assert_eq!(config.default_page_limit, 100);
    }

    #[test]
    fn test_invalid_json_config() {
        let err = LedgerConfig::from_json_str(r#"{ "schedule": { "period_days": 0 } }"#).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));

        let err = LedgerConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_json_round_trip() {
        let config = LedgerConfig::interest_free().with_sqlite("/tmp/loans.db");
        let json = config.to_json_pretty().unwrap();
        assert_eq!(LedgerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_from_env_overlay() {
        std::env::set_var(DATABASE_URL_ENV, "sqlite://ledger.db");
        std::env::set_var(ALLOW_INTEREST_FREE_ENV, "yes");
        let config = LedgerConfig::from_env();

        std::env::set_var(ALLOW_INTEREST_FREE_ENV, "sometimes");
        let invalid = LedgerConfig::from_env();

        std::env::remove_var(DATABASE_URL_ENV);
        std::env::remove_var(ALLOW_INTEREST_FREE_ENV);

        let config = config.unwrap();
        assert_eq!(config.storage, StorageConfig::Sqlite { path: "ledger.db".into() });
        assert!(config.schedule.allow_interest_free);
        assert_eq!(config.default_page(), Page::new(0, Page::DEFAULT_LIMIT));
        assert!(matches!(invalid, Err(LedgerError::InvalidConfiguration { .. })));

        assert_eq!(LedgerConfig::from_env().unwrap(), LedgerConfig::microcredit());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
