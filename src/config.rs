use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of days between borrowing and the due date
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 30;

/// Runtime settings for a library instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root directory of the flat-file store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Days from borrowing to the due date, the same for every role
    #[serde(default = "default_loan_period_days")]
    pub loan_period_days: i64,
}

/// Serde default for [`LibraryConfig::data_dir`]
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Serde default for [`LibraryConfig::loan_period_days`]
fn default_loan_period_days() -> i64 {
    DEFAULT_LOAN_PERIOD_DAYS
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir(), loan_period_days: default_loan_period_days() }
    }
}

impl LibraryConfig {
    /// Read a JSON config file. Keys left out take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read, is not valid
    /// JSON, or names a non-positive loan period.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.loan_period()?;
        Ok(config)
    }

    /// The loan period as a duration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::LoanPeriod` unless the period is at least one
    /// day and representable.
    pub fn loan_period(&self) -> Result<TimeDelta, ConfigError> {
        if self.loan_period_days <= 0 {
            return Err(ConfigError::LoanPeriod(self.loan_period_days));
        }
        TimeDelta::try_days(self.loan_period_days)
            .ok_or(ConfigError::LoanPeriod(self.loan_period_days))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = LibraryConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.loan_period().unwrap(), TimeDelta::days(30));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "data_dir": "/srv/library" }}"#).expect("write config");

        let config = LibraryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/library"));
        assert_eq!(config.loan_period_days, DEFAULT_LOAN_PERIOD_DAYS);
    }

    #[test]
    fn test_rejects_non_positive_loan_period() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "loan_period_days": 0 }}"#).expect("write config");

        let result = LibraryConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::LoanPeriod(0))));
    }

    #[test]
    fn test_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");

        assert!(matches!(LibraryConfig::from_file(file.path()), Err(ConfigError::Parse { .. })));
    }
}
