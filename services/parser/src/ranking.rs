//! Map/Rank builder - joins per-province values to boundaries and ranks them

use crate::format::{fmt_int_es, fmt_pct_plain, pctize, MISSING};
use crate::geo::BoundarySet;
use crate::names::join_key;
use serde::Serialize;
use std::cmp::Ordering;

/// Display formatting for a map; never changes the numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Percentage,
    /// Already a percentage (composition shares); shown as is.
    Share,
    Integer,
    Auto,
}

impl ValueKind {
    pub fn display(self, value: Option<f64>) -> String {
        match value.filter(|v| !v.is_nan()) {
            None => MISSING.to_string(),
            Some(v) => match self {
                ValueKind::Percentage => fmt_pct_plain(Some(pctize(v)), 1),
                ValueKind::Share => fmt_pct_plain(Some(v), 1),
                ValueKind::Integer | ValueKind::Auto => fmt_int_es(Some(v)),
            },
        }
    }
}

/// Input row: one value per province.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRow {
    pub province: String,
    pub value: Option<f64>,
    pub period: String,
}

/// A row that matched a boundary feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotRow {
    pub province: String,
    pub value: Option<f64>,
    pub period: String,
    pub boundary_id: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankRow {
    /// 1-based
    pub rank: usize,
    pub province: String,
    pub value: Option<f64>,
    pub period: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapAndRank {
    pub plot: Vec<PlotRow>,
    pub ranking: Vec<RankRow>,
    pub feature_id_key: String,
}

/// Descending by value; absent values after every present one.
fn rank_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    let a = a.filter(|v| !v.is_nan());
    let b = b.filter(|v| !v.is_nan());
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Rank rows (all of them) and keep the joinable subset for plotting.
pub fn build(rows: &[MapRow], boundaries: &BoundarySet, kind: ValueKind) -> MapAndRank {
    let plot: Vec<PlotRow> = rows
        .iter()
        .filter_map(|row| {
            let id = boundaries.lookup(&join_key(&row.province))?;
            Some(PlotRow {
                province: row.province.clone(),
                value: row.value,
                period: row.period.clone(),
                boundary_id: id.to_string(),
                display: kind.display(row.value),
            })
        })
        .collect();

    let unmatched = rows.len() - plot.len();
    if unmatched > 0 {
        tracing::warn!(unmatched, total = rows.len(), "provinces without boundary match");
    }

    let mut sorted: Vec<&MapRow> = rows.iter().collect();
    sorted.sort_by(|a, b| rank_order(a.value, b.value));

    let ranking = sorted
        .into_iter()
        .enumerate()
        .map(|(idx, row)| RankRow {
            rank: idx + 1,
            province: row.province.clone(),
            value: row.value,
            period: row.period.clone(),
            display: kind.display(row.value),
        })
        .collect();

    MapAndRank {
        plot,
        ranking,
        feature_id_key: boundaries.feature_id_key().to_string(),
    }
}
