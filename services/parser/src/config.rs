//! Environment configuration. `.env` is loaded by `main` before this runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::normalize::parse_date_str;

const DEFAULT_REPORTS_DIR: &str = "./data/dgr";
const DEFAULT_RENEWABLE_DIR: &str = "./data/renewable";
const DEFAULT_DEMAND_CSV: &str = "./data/state_daily_avg.csv";
const DEFAULT_START_DATE: &str = "2025-08-01";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Required unless running dry.
    pub db_url: Option<String>,
    pub reports_dir: PathBuf,
    pub renewable_dir: PathBuf,
    pub demand_csv: PathBuf,
    /// First report date considered when the date dimension is empty.
    pub default_start_date: NaiveDate,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let start = var("DEFAULT_START_DATE", DEFAULT_START_DATE);
        let default_start_date = parse_date_str(&start)
            .with_context(|| format!("DEFAULT_START_DATE is not a date: {start}"))?;

        Ok(Self {
            db_url: lookup("DB_URL").filter(|url| !url.trim().is_empty()),
            reports_dir: var("REPORTS_DIR", DEFAULT_REPORTS_DIR).into(),
            renewable_dir: var("RENEWABLE_DIR", DEFAULT_RENEWABLE_DIR).into(),
            demand_csv: var("DEMAND_CSV", DEFAULT_DEMAND_CSV).into(),
            default_start_date,
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.db_url, None);
        assert_eq!(cfg.reports_dir, PathBuf::from("./data/dgr"));
        assert_eq!(cfg.renewable_dir, PathBuf::from("./data/renewable"));
        assert_eq!(cfg.demand_csv, PathBuf::from("./data/state_daily_avg.csv"));
        assert_eq!(cfg.default_start_date, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
        assert!(cfg.require_db_url().is_err());
    }

    #[test]
    fn test_env_values_override_defaults() {
        let cfg = config(&[
            ("DB_URL", "postgres://localhost/grid"),
            ("REPORTS_DIR", "/srv/dgr"),
            ("DEFAULT_START_DATE", "2024-01-15"),
        ])
        .unwrap();
        assert_eq!(cfg.require_db_url().unwrap(), "postgres://localhost/grid");
        assert_eq!(cfg.reports_dir, PathBuf::from("/srv/dgr"));
        assert_eq!(cfg.default_start_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_bad_start_date_is_an_error() {
        let err = config(&[("DEFAULT_START_DATE", "soon")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_START_DATE"));
    }
}
