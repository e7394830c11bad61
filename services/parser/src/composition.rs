//! Composition analyzer - shares of sectors/branches within a province total

use crate::format::fmt_pct_plain;
use crate::ranking::MapRow;
use serde::Serialize;

/// Province x category table, one value column per period.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositionTable {
    pub periods: Vec<String>,
    pub rows: Vec<CompositionRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionRow {
    pub province: String,
    pub category: String,
    /// Aligned with `CompositionTable::periods`.
    pub values: Vec<Option<f64>>,
}

impl CompositionRow {
    fn last_value(&self, periods: usize) -> Option<f64> {
        periods
            .checked_sub(1)
            .and_then(|idx| self.values.get(idx).copied().flatten())
    }
}

/// A category with its percentage of the province total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub category: String,
    pub pct: f64,
}

impl CompositionTable {
    /// Header of the most recent period column.
    pub fn last_period(&self) -> Option<&str> {
        self.periods.last().map(String::as_str)
    }

    /// Sorted, de-duplicated category names.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.rows.iter().map(|r| r.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Sorted, de-duplicated province names.
    pub fn provinces(&self) -> Vec<String> {
        let mut provinces: Vec<String> = self.rows.iter().map(|r| r.province.clone()).collect();
        provinces.sort();
        provinces.dedup();
        provinces
    }

    pub fn has_province(&self, province: &str) -> bool {
        self.rows.iter().any(|r| r.province == province)
    }

    /// (category, last-period value) for a province, unparseable values dropped.
    fn latest_values<'a>(&'a self, province: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let periods = self.periods.len();
        self.rows
            .iter()
            .filter(move |r| r.province == province)
            .filter_map(move |r| r.last_value(periods).map(|v| (r.category.as_str(), v)))
    }

    /// Province total over the last period; `None` when zero or not finite.
    fn total(&self, province: &str) -> Option<f64> {
        let total: f64 = self.latest_values(province).map(|(_, v)| v).sum();
        (total.is_finite() && total != 0.0).then_some(total)
    }
}

/// Top `limit` categories of a province by share of the last-period total.
/// Ties keep the table's row order.
pub fn top_categories(table: &CompositionTable, province: &str, limit: usize) -> Vec<Share> {
    let Some(total) = table.total(province) else {
        return Vec::new();
    };

    let mut shares: Vec<Share> = table
        .latest_values(province)
        .map(|(category, value)| Share {
            category: category.to_string(),
            pct: value / total * 100.0,
        })
        .collect();

    // sort_by is stable
    shares.sort_by(|a, b| b.pct.total_cmp(&a.pct));
    shares.truncate(limit);
    shares
}

/// One category's share of the full province total (case-insensitive match).
pub fn share_of(table: &CompositionTable, province: &str, category: &str) -> Option<f64> {
    let total = table.total(province)?;
    let wanted = category.trim().to_lowercase();
    let periods = table.periods.len();
    table
        .rows
        .iter()
        .find(|r| r.province == province && r.category.to_lowercase() == wanted)
        .and_then(|r| r.last_value(periods))
        .map(|v| v / total * 100.0)
}

fn pct_text(pct: f64) -> String {
    fmt_pct_plain(Some(pct), 1)
}

/// "A (x% <suffix>) y B (y%)." for the first one or two shares.
fn describe_top(shares: &[Share], suffix: &str) -> String {
    match shares {
        [first, second, ..] => format!(
            "{} ({} {}) y {} ({}).",
            first.category,
            pct_text(first.pct),
            suffix,
            second.category,
            pct_text(second.pct)
        ),
        [only] => format!("{} ({} {}).", only.category, pct_text(only.pct), suffix),
        [] => String::new(),
    }
}

/// Narrative summary of a province's productive structure.
///
/// Names the top sectors, adds the target sector's weight when it is not one
/// of them, then the top branches measured against the branch table's own
/// province total.
pub fn summarize(
    sectors: &CompositionTable,
    branches: Option<&CompositionTable>,
    province: &str,
    target_sector: &str,
) -> Option<String> {
    let top_sectors = top_categories(sectors, province, 2);
    if top_sectors.is_empty() {
        return None;
    }

    let mut text = format!(
        "Sus principales sectores son {}",
        describe_top(&top_sectors, "del VAB")
    );

    let target = target_sector.trim().to_lowercase();
    let target_shown = top_sectors
        .iter()
        .any(|s| s.category.to_lowercase() == target);
    if !target_shown {
        if let Some(pct) = share_of(sectors, province, target_sector) {
            text.push_str(&format!(" La {} pesa {}.", target, pct_text(pct)));
        }
    }

    if let Some(branches) = branches {
        let top_branches = top_categories(branches, province, 2);
        if !top_branches.is_empty() {
            text.push_str(&format!(
                " Las principales ramas industriales son {}",
                describe_top(&top_branches, "del VAB industrial")
            ));
        }
    }

    Some(text)
}

/// Per-province share of `category`, for the sector and branch maps.
/// Provinces without rows are skipped; rows without a usable share carry `None`.
pub fn share_by_province(
    table: &CompositionTable,
    provinces: &[String],
    category: &str,
) -> Vec<MapRow> {
    let period = table.last_period().unwrap_or_default().to_string();
    provinces
        .iter()
        .filter(|p| table.has_province(p))
        .map(|p| MapRow {
            province: p.clone(),
            value: share_of(table, p, category),
            period: period.clone(),
        })
        .collect()
}
