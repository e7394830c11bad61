//! Series store - the three long-format partitions and their variable catalog
//!
//! Each partition loads independently: a sheet that fails marks only that
//! partition unavailable. Queries never mutate the store.

use crate::composition::CompositionTable;
use crate::config::SourceConfig;
use crate::ranking::MapRow;
use crate::sheets::{self, Observation, RawSheet};
use crate::workbook::{LoadCache, LoadError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

/// Which partition a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Annual,
    Quarterly,
    Rate,
}

/// Outcome of loading one sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetState<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> SheetState<T> {
    pub fn from_result(result: Result<T, LoadError>) -> Self {
        match result {
            Ok(data) => SheetState::Ready(data),
            Err(e) => SheetState::Unavailable(e.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SheetState::Ready(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            SheetState::Ready(data) => Some(data),
            SheetState::Unavailable(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SheetState::Ready(_) => None,
            SheetState::Unavailable(reason) => Some(reason),
        }
    }
}

/// Read a sheet through the cache and parse it, logging a failure once here.
fn load_sheet<T>(
    config: &SourceConfig,
    cache: &LoadCache<RawSheet>,
    sheet: &str,
    parse: impl FnOnce(&RawSheet) -> T,
) -> SheetState<T> {
    let result = cache
        .sheet(&config.workbook_path, sheet)
        .map(|raw| parse(&*raw));
    if let Err(e) = &result {
        tracing::warn!(sheet, error = %e, "sheet unavailable");
    }
    SheetState::from_result(result)
}

fn sorted_variables(observations: &[Observation]) -> Vec<String> {
    observations
        .iter()
        .map(|o| o.variable.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Per-capita and population variables are levels, not trends.
fn is_evolution_excluded(variable: &str) -> bool {
    let v = variable.to_lowercase();
    ["poblacion", "población", "cada 1.000", "cada 1000", "por 1000", "por 1.000"]
        .iter()
        .any(|needle| v.contains(needle))
}

/// Sorted variable names per partition plus a direct name -> partition map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableCatalog {
    sources: HashMap<String, Source>,
    annual: Vec<String>,
    quarterly: Vec<String>,
    rate: Vec<String>,
}

impl VariableCatalog {
    /// A name present in several partitions resolves to the first of
    /// annual, quarterly, rate.
    pub fn build(annual: &[Observation], quarterly: &[Observation], rate: &[Observation]) -> Self {
        let annual = sorted_variables(annual);
        let quarterly = sorted_variables(quarterly);
        let rate = sorted_variables(rate);

        let mut sources = HashMap::new();
        for (names, source) in [
            (&annual, Source::Annual),
            (&quarterly, Source::Quarterly),
            (&rate, Source::Rate),
        ] {
            for name in names {
                sources.entry(name.clone()).or_insert(source);
            }
        }

        Self {
            sources,
            annual,
            quarterly,
            rate,
        }
    }

    pub fn source_of(&self, variable: &str) -> Option<Source> {
        self.sources.get(variable).copied()
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.sources.contains_key(variable)
    }

    pub fn annual(&self) -> &[String] {
        &self.annual
    }

    pub fn quarterly(&self) -> &[String] {
        &self.quarterly
    }

    pub fn rate(&self) -> &[String] {
        &self.rate
    }

    /// Annual, then quarterly, then rate.
    pub fn all(&self) -> Vec<String> {
        self.annual
            .iter()
            .chain(&self.quarterly)
            .chain(&self.rate)
            .cloned()
            .collect()
    }

    /// Variables offered for the time-series view.
    pub fn evolution(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|v| !is_evolution_excluded(v))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub period: String,
    pub value: f64,
    pub period_num: i64,
}

/// Chronologically ordered points with a present value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series(Vec<Point>);

impl Series {
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// (period label, value) of the final point.
    pub fn last(&self) -> Option<(&str, f64)> {
        self.0.last().map(|p| (p.period.as_str(), p.value))
    }
}

/// Wide period x province view for the comparison tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub provinces: Vec<String>,
    pub periods: Vec<String>,
    /// `cells[period][province]`, aligned with `periods` and `provinces`.
    pub cells: Vec<Vec<Option<f64>>>,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    source: Source,
    province: &'a str,
    variable: &'a str,
    period: &'a str,
    period_num: i64,
    value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SeriesStore {
    annual: SheetState<Vec<Observation>>,
    quarterly: SheetState<Vec<Observation>>,
    rate: SheetState<Vec<Observation>>,
    rate_label: String,
    catalog: VariableCatalog,
    provinces: Vec<String>,
}

impl SeriesStore {
    pub fn load(config: &SourceConfig, cache: &LoadCache<RawSheet>) -> Self {
        let annual = load_sheet(config, cache, &config.sheet_annual, sheets::parse_annual);
        let quarterly = load_sheet(config, cache, &config.sheet_quarterly, sheets::parse_quarterly);
        let rate = load_sheet(config, cache, &config.sheet_rate, |raw| {
            sheets::parse_rate_matrix(raw, &config.rate_calendar, &config.rate_label)
        });
        Self::from_parts(annual, quarterly, rate, &config.rate_label)
    }

    pub fn from_parts(
        annual: SheetState<Vec<Observation>>,
        quarterly: SheetState<Vec<Observation>>,
        rate: SheetState<Vec<Observation>>,
        rate_label: &str,
    ) -> Self {
        let empty: &[Observation] = &[];
        let catalog = VariableCatalog::build(
            annual.data().map_or(empty, Vec::as_slice),
            quarterly.data().map_or(empty, Vec::as_slice),
            rate.data().map_or(empty, Vec::as_slice),
        );
        let provinces = annual
            .data()
            .map(|obs| {
                obs.iter()
                    .map(|o| o.province.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            annual = annual.data().map_or(0, Vec::len),
            quarterly = quarterly.data().map_or(0, Vec::len),
            rate = rate.data().map_or(0, Vec::len),
            variables = catalog.sources.len(),
            "series store ready"
        );

        Self {
            annual,
            quarterly,
            rate,
            rate_label: rate_label.to_string(),
            catalog,
            provinces,
        }
    }

    pub fn partition(&self, source: Source) -> &SheetState<Vec<Observation>> {
        match source {
            Source::Annual => &self.annual,
            Source::Quarterly => &self.quarterly,
            Source::Rate => &self.rate,
        }
    }

    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    pub fn rate_label(&self) -> &str {
        &self.rate_label
    }

    /// Sorted unique provinces of the annual partition.
    pub fn provinces(&self) -> &[String] {
        &self.provinces
    }

    pub fn has_province(&self, province: &str) -> bool {
        self.provinces.binary_search_by(|p| p.as_str().cmp(province)).is_ok()
    }

    pub fn get_series(&self, province: &str, variable: &str) -> Series {
        let Some(source) = self.catalog.source_of(variable) else {
            return Series::default();
        };
        let Some(observations) = self.partition(source).data() else {
            return Series::default();
        };

        // the rate partition holds a single variable
        let matches = |o: &&Observation| match source {
            Source::Rate => o.province == province,
            Source::Annual | Source::Quarterly => o.province == province && o.variable == variable,
        };

        let mut points: Vec<Point> = observations
            .iter()
            .filter(matches)
            .filter_map(|o| {
                o.value.map(|value| Point {
                    period: o.period.clone(),
                    value,
                    period_num: o.period_num,
                })
            })
            .collect();
        points.sort_by_key(|p| p.period_num);
        Series(points)
    }

    /// Last value of `variable` for every annual province that has one. The
    /// variable's own partition supplies the provinces only when the annual
    /// list is empty, so every ranked province is also a valid `/series` key.
    pub fn latest_by_province(&self, variable: &str) -> Vec<MapRow> {
        let provinces: Vec<String> = match self.catalog.source_of(variable) {
            _ if !self.provinces.is_empty() => self.provinces.clone(),
            Some(source) => self
                .partition(source)
                .data()
                .map(|obs| {
                    obs.iter()
                        .map(|o| o.province.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        provinces
            .into_iter()
            .filter_map(|province| {
                let series = self.get_series(&province, variable);
                let (period, value) = series.last()?;
                Some(MapRow {
                    period: period.to_string(),
                    value: Some(value),
                    province,
                })
            })
            .collect()
    }

    /// Union of the selected provinces' periods, ordered by `period_num`.
    pub fn comparison(&self, variable: &str, provinces: &[String]) -> ComparisonTable {
        let series: Vec<Series> = provinces
            .iter()
            .map(|p| self.get_series(p, variable))
            .collect();

        let mut periods: BTreeMap<i64, String> = BTreeMap::new();
        for point in series.iter().flat_map(Series::points) {
            periods
                .entry(point.period_num)
                .or_insert_with(|| point.period.clone());
        }

        let cells = periods
            .keys()
            .map(|num| {
                series
                    .iter()
                    .map(|s| {
                        s.points()
                            .iter()
                            .find(|p| p.period_num == *num)
                            .map(|p| p.value)
                    })
                    .collect()
            })
            .collect();

        ComparisonTable {
            provinces: provinces.to_vec(),
            periods: periods.into_values().collect(),
            cells,
        }
    }

    /// Write every loaded observation as long-format CSV. Returns the row count.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize, csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut count = 0;
        for source in [Source::Annual, Source::Quarterly, Source::Rate] {
            for o in self.partition(source).data().into_iter().flatten() {
                wtr.serialize(ExportRow {
                    source,
                    province: &o.province,
                    variable: &o.variable,
                    period: &o.period,
                    period_num: o.period_num,
                    value: o.value,
                })?;
                count += 1;
            }
        }
        wtr.flush()?;
        Ok(count)
    }
}

/// The two wide composition tables.
#[derive(Debug, Clone)]
pub struct Compositions {
    pub sectors: SheetState<CompositionTable>,
    pub branches: SheetState<CompositionTable>,
}

impl Compositions {
    pub fn load(config: &SourceConfig, cache: &LoadCache<RawSheet>) -> Self {
        Self {
            sectors: load_sheet(config, cache, &config.sheet_sectors, sheets::parse_composition),
            branches: load_sheet(config, cache, &config.sheet_branches, sheets::parse_composition),
        }
    }
}
