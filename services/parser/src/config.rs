//! Source configuration, read from the environment (`.env` supported by the binaries).

use crate::calendar::RateCalendar;
use crate::roles::RATE_LABEL;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must look like YYYY-MM, got '{value}'")]
    InvalidMonth { var: &'static str, value: String },

    #[error("rate calendar {start}..{end} is empty")]
    EmptyCalendar { start: String, end: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub workbook_path: PathBuf,
    pub sheet_annual: String,
    pub sheet_quarterly: String,
    pub sheet_rate: String,
    pub sheet_sectors: String,
    pub sheet_branches: String,
    /// Variable name given to every rate-matrix observation.
    pub rate_label: String,
    pub rate_calendar: RateCalendar,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            workbook_path: PathBuf::from("data/vs_code.xlsx"),
            sheet_annual: "anual".to_string(),
            sheet_quarterly: "trim".to_string(),
            sheet_rate: "art".to_string(),
            sheet_sectors: "vabporsector".to_string(),
            sheet_branches: "vabporramas".to_string(),
            rate_label: RATE_LABEL.to_string(),
            rate_calendar: RateCalendar::default(),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// "2020-11" -> (2020, 11)
fn parse_month(var: &'static str, value: &str) -> Result<(i32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidMonth {
        var,
        value: value.to_string(),
    };
    let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

impl SourceConfig {
    /// Variables:
    /// - WORKBOOK_PATH (default data/vs_code.xlsx)
    /// - SHEET_ANNUAL, SHEET_QUARTERLY, SHEET_RATE, SHEET_SECTORS, SHEET_BRANCHES
    /// - RATE_LABEL
    /// - RATE_START, RATE_END as YYYY-MM (default 2020-11 .. 2025-10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let start = env_or("RATE_START", "2020-11");
        let end = env_or("RATE_END", "2025-10");
        let (start_year, start_month) = parse_month("RATE_START", &start)?;
        let (end_year, end_month) = parse_month("RATE_END", &end)?;
        let rate_calendar = RateCalendar::monthly(start_year, start_month, end_year, end_month);
        if rate_calendar.is_empty() {
            return Err(ConfigError::EmptyCalendar { start, end });
        }

        Ok(Self {
            workbook_path: std::env::var("WORKBOOK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.workbook_path),
            sheet_annual: env_or("SHEET_ANNUAL", &defaults.sheet_annual),
            sheet_quarterly: env_or("SHEET_QUARTERLY", &defaults.sheet_quarterly),
            sheet_rate: env_or("SHEET_RATE", &defaults.sheet_rate),
            sheet_sectors: env_or("SHEET_SECTORS", &defaults.sheet_sectors),
            sheet_branches: env_or("SHEET_BRANCHES", &defaults.sheet_branches),
            rate_label: env_or("RATE_LABEL", &defaults.rate_label),
            rate_calendar,
        })
    }
}
