//! Indicator roles - the labels the dashboard gives a meaning to
//!
//! Each role is a fixed label that must exist in the data it refers to.
//! A label missing from a sheet that did load is a configuration error;
//! a label whose sheet is unavailable just resolves to `None`.

use crate::composition::CompositionTable;
use crate::ranking::ValueKind;
use crate::store::{SeriesStore, SheetState, Source};
use serde::Serialize;
use thiserror::Error;

pub const TARGET_SECTOR: &str = "Industria manufacturera";
pub const RATE_LABEL: &str = "Alícuota promedio ART";
pub const KPI_FIRMS: &str = "Cantidad de empresas industriales";
pub const KPI_EXPORTS: &str = "Expo MOA+MOI (M u$s)";
/// Matched against quarterly variable names, case-insensitive substring.
pub const EMPLOYMENT_KEYWORD: &str = "empleo industrial";

/// Indicators allowed on the indicator map, in menu order.
pub const MAP_INDICATORS: &[(&str, ValueKind)] = &[
    ("Industria / VAB Total", ValueKind::Percentage),
    ("VAB por 1000 habitantes", ValueKind::Integer),
    ("Empleo formal cada 1.000 habitantes", ValueKind::Integer),
    ("Empleo industrial cada 1.000 habitantes", ValueKind::Integer),
    ("Empresas industriales cada 1.000 habitantes", ValueKind::Integer),
    ("Empresas cada 1.000 habitantes", ValueKind::Integer),
    ("MOA+MOI / Expo", ValueKind::Percentage),
    (RATE_LABEL, ValueKind::Percentage),
];

/// Display kind of an allow-listed map indicator.
pub fn map_indicator_kind(label: &str) -> Option<ValueKind> {
    MAP_INDICATORS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("{role} label '{label}' not found in the loaded {partition} data")]
    Missing {
        role: &'static str,
        label: String,
        partition: &'static str,
    },
}

/// Labels resolved against what actually loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorRoles {
    pub target_sector: Option<String>,
    pub firms: Option<String>,
    pub exports: Option<String>,
    pub employment: Option<String>,
    pub rate: Option<String>,
    /// Allow-listed map indicators present in the catalog.
    pub map_indicators: Vec<String>,
}

impl IndicatorRoles {
    pub fn resolve(
        store: &SeriesStore,
        sectors: &SheetState<CompositionTable>,
    ) -> Result<Self, RoleError> {
        let catalog = store.catalog();
        let loaded = |source: Source| {
            store
                .partition(source)
                .data()
                .is_some_and(|obs| !obs.is_empty())
        };

        let annual_label = |role: &'static str, label: &str| -> Result<Option<String>, RoleError> {
            if !loaded(Source::Annual) {
                return Ok(None);
            }
            if catalog.annual().iter().any(|v| v == label) {
                Ok(Some(label.to_string()))
            } else {
                Err(RoleError::Missing {
                    role,
                    label: label.to_string(),
                    partition: "annual",
                })
            }
        };

        let firms = annual_label("firms KPI", KPI_FIRMS)?;
        let exports = annual_label("exports KPI", KPI_EXPORTS)?;

        let employment = if loaded(Source::Quarterly) {
            let found = catalog
                .quarterly()
                .iter()
                .find(|v| v.to_lowercase().contains(EMPLOYMENT_KEYWORD))
                .ok_or_else(|| RoleError::Missing {
                    role: "employment KPI",
                    label: EMPLOYMENT_KEYWORD.to_string(),
                    partition: "quarterly",
                })?;
            Some(found.clone())
        } else {
            None
        };

        let rate = if loaded(Source::Rate) {
            let label = store.rate_label();
            if !catalog.rate().iter().any(|v| v == label) {
                return Err(RoleError::Missing {
                    role: "rate",
                    label: label.to_string(),
                    partition: "rate",
                });
            }
            Some(label.to_string())
        } else {
            None
        };

        let target_sector = match sectors.data().filter(|t| !t.rows.is_empty()) {
            None => None,
            Some(table) => {
                let wanted = TARGET_SECTOR.to_lowercase();
                let found = table
                    .categories()
                    .into_iter()
                    .find(|c| c.to_lowercase() == wanted)
                    .ok_or_else(|| RoleError::Missing {
                        role: "target sector",
                        label: TARGET_SECTOR.to_string(),
                        partition: "sector composition",
                    })?;
                Some(found)
            }
        };

        let map_indicators = MAP_INDICATORS
            .iter()
            .map(|(label, _)| *label)
            .filter(|label| catalog.contains(label))
            .map(str::to_string)
            .collect();

        Ok(Self {
            target_sector,
            firms,
            exports,
            employment,
            rate,
            map_indicators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositionRow;
    use crate::sheets::Observation;

    fn obs(variable: &str) -> Observation {
        Observation {
            province: "Córdoba".to_string(),
            variable: variable.to_string(),
            period: "2023".to_string(),
            period_num: 2023,
            value: Some(1.0),
        }
    }

    fn sectors(categories: &[&str]) -> SheetState<CompositionTable> {
        SheetState::Ready(CompositionTable {
            periods: vec!["2022".to_string()],
            rows: categories
                .iter()
                .map(|c| CompositionRow {
                    province: "Córdoba".to_string(),
                    category: c.to_string(),
                    values: vec![Some(1.0)],
                })
                .collect(),
        })
    }

    fn full_store() -> SeriesStore {
        SeriesStore::from_parts(
            SheetState::Ready(vec![
                obs(KPI_FIRMS),
                obs(KPI_EXPORTS),
                obs("Industria / VAB Total"),
                obs("VAB por 1000 habitantes"),
            ]),
            SheetState::Ready(vec![obs("Empleo Industrial privado registrado")]),
            SheetState::Ready(vec![obs(RATE_LABEL)]),
            RATE_LABEL,
        )
    }

    #[test]
    fn test_resolve_all_roles() {
        let roles = IndicatorRoles::resolve(&full_store(), &sectors(&["INDUSTRIA MANUFACTURERA", "Agro"]))
            .unwrap();
        assert_eq!(roles.firms.as_deref(), Some(KPI_FIRMS));
        assert_eq!(roles.exports.as_deref(), Some(KPI_EXPORTS));
        assert_eq!(roles.employment.as_deref(), Some("Empleo Industrial privado registrado"));
        assert_eq!(roles.rate.as_deref(), Some(RATE_LABEL));
        assert_eq!(roles.target_sector.as_deref(), Some("INDUSTRIA MANUFACTURERA"));
        assert_eq!(
            roles.map_indicators,
            vec!["Industria / VAB Total", "VAB por 1000 habitantes", RATE_LABEL]
        );
    }

    #[test]
    fn test_missing_label_in_loaded_sheet_fails() {
        let store = SeriesStore::from_parts(
            SheetState::Ready(vec![obs(KPI_FIRMS)]),
            SheetState::Ready(vec![]),
            SheetState::Ready(vec![]),
            RATE_LABEL,
        );
        let err = IndicatorRoles::resolve(&store, &sectors(&["Agro"])).unwrap_err();
        assert_eq!(
            err,
            RoleError::Missing {
                role: "exports KPI",
                label: KPI_EXPORTS.to_string(),
                partition: "annual",
            }
        );
    }

    #[test]
    fn test_missing_target_sector_fails() {
        let err = IndicatorRoles::resolve(&full_store(), &sectors(&["Agro"])).unwrap_err();
        assert!(matches!(err, RoleError::Missing { partition: "sector composition", .. }));
    }

    #[test]
    fn test_missing_employment_keyword_fails() {
        let store = SeriesStore::from_parts(
            SheetState::Ready(vec![obs(KPI_FIRMS), obs(KPI_EXPORTS)]),
            SheetState::Ready(vec![obs("Salario promedio")]),
            SheetState::Unavailable("gone".into()),
            RATE_LABEL,
        );
        let err = IndicatorRoles::resolve(&store, &SheetState::Unavailable("gone".into())).unwrap_err();
        assert!(matches!(err, RoleError::Missing { partition: "quarterly", .. }));
    }

    #[test]
    fn test_unavailable_sheets_resolve_to_none() {
        let store = SeriesStore::from_parts(
            SheetState::Unavailable("no annual".into()),
            SheetState::Unavailable("no trim".into()),
            SheetState::Unavailable("no art".into()),
            RATE_LABEL,
        );
        let roles = IndicatorRoles::resolve(&store, &SheetState::Unavailable("no sectors".into()))
            .unwrap();
        assert_eq!(roles, IndicatorRoles::default());
    }

    #[test]
    fn test_map_indicator_kinds() {
        assert_eq!(map_indicator_kind("MOA+MOI / Expo"), Some(ValueKind::Percentage));
        assert_eq!(map_indicator_kind("Empresas cada 1.000 habitantes"), Some(ValueKind::Integer));
        assert_eq!(map_indicator_kind(RATE_LABEL), Some(ValueKind::Percentage));
        assert_eq!(map_indicator_kind("Población"), None);
        assert_eq!(MAP_INDICATORS.len(), 8);
    }
}
