//! Monitor Provincial core - reshapes the provincial indicators workbook
//!
//! Responsibilities:
//! - Read workbook sheets through calamine into a neutral cell grid
//! - Parse annual, quarterly, rate-matrix and composition sheets
//! - Keep every long-format observation in an immutable series store
//! - Answer series, composition and map/ranking queries over the store
//!
//! CRITICAL: parsing must be DETERMINISTIC
//! Same workbook + same configuration = same store

pub mod calendar;
pub mod composition;
pub mod config;
pub mod format;
pub mod geo;
pub mod names;
pub mod ranking;
pub mod roles;
pub mod sheets;
pub mod store;
pub mod workbook;

pub use calendar::{CalendarPeriod, RateCalendar};
pub use composition::{CompositionRow, CompositionTable, Share};
pub use config::{ConfigError, SourceConfig};
pub use geo::{BoundarySet, GeoError};
pub use ranking::{MapAndRank, MapRow, PlotRow, RankRow, ValueKind};
pub use roles::{IndicatorRoles, RoleError};
pub use sheets::{Cell, Observation, RawSheet};
pub use store::{ComparisonTable, Compositions, Point, Series, SeriesStore, SheetState, Source, VariableCatalog};
pub use workbook::{LoadCache, LoadError, SheetKey};
