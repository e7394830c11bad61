//! Fixed monthly axis for the headerless rate matrix.

use chrono::{Datelike, Months, NaiveDate};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

/// One month of the rate calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarPeriod {
    /// e.g. "nov-20"
    pub label: String,
    /// year * 100 + month
    pub period_num: i64,
}

/// Ordered sequence of months assigned positionally to rate-matrix columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateCalendar {
    periods: Vec<CalendarPeriod>,
}

impl RateCalendar {
    /// Every month from `start` through `end`, both inclusive.
    /// An inverted or invalid range yields an empty calendar.
    pub fn monthly(start_year: i32, start_month: u32, end_year: i32, end_month: u32) -> Self {
        let mut periods = Vec::new();
        let (Some(mut current), Some(end)) = (
            NaiveDate::from_ymd_opt(start_year, start_month, 1),
            NaiveDate::from_ymd_opt(end_year, end_month, 1),
        ) else {
            return Self { periods };
        };

        while current <= end {
            let month = current.month();
            let year = current.year();
            periods.push(CalendarPeriod {
                label: format!(
                    "{}-{:02}",
                    MONTH_ABBREVIATIONS[(month - 1) as usize],
                    year.rem_euclid(100)
                ),
                period_num: i64::from(year) * 100 + i64::from(month),
            });
            match current.checked_add_months(Months::new(1)) {
                Some(next) => current = next,
                None => break,
            }
        }

        Self { periods }
    }

    pub fn periods(&self) -> &[CalendarPeriod] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

impl Default for RateCalendar {
    /// nov-20 through oct-25.
    fn default() -> Self {
        Self::monthly(2020, 11, 2025, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_calendar_has_sixty_months() {
        let cal = RateCalendar::default();
        assert_eq!(cal.len(), 60);
        assert_eq!(cal.periods()[0].label, "nov-20");
        assert_eq!(cal.periods()[0].period_num, 202011);
        assert_eq!(cal.periods()[59].label, "oct-25");
        assert_eq!(cal.periods()[59].period_num, 202510);
    }

    #[test]
    fn test_calendar_crosses_year_boundary() {
        let cal = RateCalendar::monthly(2020, 11, 2021, 2);
        let labels: Vec<&str> = cal.periods().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["nov-20", "dic-20", "ene-21", "feb-21"]);
    }

    #[test]
    fn test_calendar_strictly_increasing() {
        let cal = RateCalendar::default();
        for pair in cal.periods().windows(2) {
            assert!(pair[0].period_num < pair[1].period_num);
        }
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(RateCalendar::monthly(2025, 1, 2024, 1).is_empty());
        assert!(RateCalendar::monthly(2025, 13, 2026, 1).is_empty());
    }
}
