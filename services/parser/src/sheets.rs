//! Sheet parsers - reshape raw workbook grids into long-format observations
//!
//! Four layouts are supported:
//! - annual: province, variable, one column per year
//! - quarterly: province, variable, one column per `<I..IV>-<yy>` quarter
//! - rate matrix: no usable header, monthly columns laid on a fixed calendar
//! - composition: province, category, one column per period (kept wide)
//!
//! All parsers are pure: same grid = same output.

use crate::calendar::RateCalendar;
use crate::composition::{CompositionRow, CompositionTable};
use crate::names::is_placeholder;
use serde::Serialize;

/// A workbook cell, decoupled from the spreadsheet engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Text form used for names and header labels.
    pub fn label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => v.to_string(),
        }
    }

    /// Numeric coercion: numbers pass, numeric text parses, anything else is absent.
    pub fn number(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Empty => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// A rectangular (possibly ragged) sheet as read from the workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Grid row of the header: the first row holding any value. Leading blank
    /// rows of a headed sheet are not part of its table.
    fn header_index(&self) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.iter().any(|c| *c != Cell::Empty))
    }

    fn header(&self) -> Option<&[Cell]> {
        self.header_index().map(|i| self.rows[i].as_slice())
    }

    fn data_rows(&self) -> impl Iterator<Item = &[Cell]> {
        let start = self.header_index().map_or(self.rows.len(), |i| i + 1);
        self.rows.iter().skip(start).map(Vec::as_slice)
    }

    /// Every row but sheet row 1, blank or not.
    fn rows_after_first(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().skip(1).map(Vec::as_slice)
    }
}

/// The atomic long-format record shared by every partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub province: String,
    pub variable: String,
    pub period: String,
    pub period_num: i64,
    pub value: Option<f64>,
}

fn cell_label(row: &[Cell], idx: usize) -> String {
    row.get(idx).map(Cell::label).unwrap_or_default()
}

/// Reshape a wide province/variable sheet. Header columns whose label is
/// rejected by `period_num` are not periods and emit nothing.
fn melt_wide<F>(sheet: &RawSheet, period_num: F) -> Vec<Observation>
where
    F: Fn(&str) -> Option<i64>,
{
    let Some(header) = sheet.header() else {
        return Vec::new();
    };

    let periods: Vec<(usize, String, i64)> = header
        .iter()
        .enumerate()
        .skip(2)
        .filter_map(|(idx, cell)| {
            let label = cell.label();
            period_num(&label).map(|num| (idx, label, num))
        })
        .collect();

    let mut observations = Vec::new();
    let mut skipped = 0;

    for row in sheet.data_rows() {
        let province = cell_label(row, 0);
        let variable = cell_label(row, 1);
        if is_placeholder(&province) || is_placeholder(&variable) {
            skipped += 1;
            continue;
        }

        for (idx, label, num) in &periods {
            observations.push(Observation {
                province: province.clone(),
                variable: variable.clone(),
                period: label.clone(),
                period_num: *num,
                value: row.get(*idx).and_then(Cell::number),
            });
        }
    }

    tracing::debug!(
        sheet = %sheet.name,
        periods = periods.len(),
        observations = observations.len(),
        skipped_rows = skipped,
        "reshaped wide sheet"
    );

    observations
}

/// Annual header: the label itself is the year.
pub fn annual_period_num(label: &str) -> Option<i64> {
    let year = label.trim().parse::<f64>().ok()?;
    year.is_finite().then_some(year.trunc() as i64)
}

/// Quarterly header `<I|II|III|IV>-<yy>` -> (year, quarter).
/// Two-digit years below 50 land in the 2000s, the rest in the 1900s.
pub fn parse_quarter_label(label: &str) -> Option<(i32, u32)> {
    let (numeral, year) = label.trim().split_once('-')?;
    let quarter = match numeral.trim() {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        _ => return None,
    };
    let digits = year.trim();
    let short: i32 = digits.parse().ok()?;
    if short < 0 {
        return None;
    }
    let full = if digits.len() > 2 {
        short
    } else if short < 50 {
        2000 + short
    } else {
        1900 + short
    };
    Some((full, quarter))
}

pub fn quarterly_period_num(label: &str) -> Option<i64> {
    parse_quarter_label(label).map(|(year, quarter)| i64::from(year) * 10 + i64::from(quarter))
}

/// Parse the annual wide sheet. Columns whose header is not a number are dropped.
pub fn parse_annual(sheet: &RawSheet) -> Vec<Observation> {
    melt_wide(sheet, annual_period_num)
}

/// Parse the quarterly wide sheet. Unparseable values stay as absent rows.
pub fn parse_quarterly(sheet: &RawSheet) -> Vec<Observation> {
    melt_wide(sheet, quarterly_period_num)
}

/// Rate cell: "3,4%" -> 3.4, 0.034 -> 3.4, 45 -> 45.
pub fn parse_rate_cell(cell: &Cell) -> Option<f64> {
    let raw = match cell {
        Cell::Number(v) => *v,
        Cell::Text(s) => s.replace('%', "").replace(',', ".").trim().parse::<f64>().ok()?,
        Cell::Empty => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(if raw.abs() < 1.0 { raw * 100.0 } else { raw })
}

/// Parse the headerless rate matrix. The first row is skipped whatever it
/// holds; column `i + 1` is the `i`-th calendar month.
pub fn parse_rate_matrix(sheet: &RawSheet, calendar: &RateCalendar, label: &str) -> Vec<Observation> {
    let mut observations = Vec::new();

    for row in sheet.rows_after_first() {
        let province = cell_label(row, 0);
        if is_placeholder(&province) {
            continue;
        }

        for (i, period) in calendar.periods().iter().enumerate() {
            let Some(cell) = row.get(i + 1) else {
                break;
            };
            observations.push(Observation {
                province: province.clone(),
                variable: label.to_string(),
                period: period.label.clone(),
                period_num: period.period_num,
                value: parse_rate_cell(cell),
            });
        }
    }

    tracing::debug!(
        sheet = %sheet.name,
        months = calendar.len(),
        observations = observations.len(),
        "parsed rate matrix"
    );

    observations
}

/// Parse a province x category table, kept wide.
pub fn parse_composition(sheet: &RawSheet) -> CompositionTable {
    let Some(header) = sheet.header() else {
        return CompositionTable::default();
    };
    let periods: Vec<String> = header.iter().skip(2).map(Cell::label).collect();

    let rows = sheet
        .data_rows()
        .filter_map(|row| {
            let province = cell_label(row, 0);
            let category = cell_label(row, 1);
            if is_placeholder(&province) || is_placeholder(&category) {
                return None;
            }
            let values = (0..periods.len())
                .map(|i| row.get(i + 2).and_then(Cell::number))
                .collect();
            Some(CompositionRow {
                province,
                category,
                values,
            })
        })
        .collect();

    CompositionTable { periods, rows }
}
