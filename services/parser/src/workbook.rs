//! Workbook access and the at-most-once sheet cache.
//!
//! A workbook that cannot be opened, or a sheet that is not there, is a
//! [`LoadError`]; callers turn it into an "unavailable" state for the
//! features that depend on that sheet only.

use crate::sheets::{Cell, RawSheet};
use calamine::{open_workbook_auto, Data, Range, Reader};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("cannot open workbook {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("sheet '{sheet}' not found in {path} (available: {available})")]
    MissingSheet {
        path: String,
        sheet: String,
        available: String,
    },

    #[error("cannot read sheet '{sheet}': {reason}")]
    Read { sheet: String, reason: String },
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
    }
}

/// Lay a used range back onto sheet coordinates: grid cell `[r][c]` is sheet
/// row `r + 1`, column `c + 1`, even when the used range starts further down
/// or further right.
fn range_to_sheet(name: &str, range: &Range<Data>) -> RawSheet {
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let leading = std::iter::repeat_with(Vec::new).take(row_offset);
    let body = range.rows().map(|row| {
        std::iter::repeat(Cell::Empty)
            .take(col_offset)
            .chain(row.iter().map(to_cell))
            .collect()
    });

    RawSheet::new(name, leading.chain(body).collect())
}

/// Read one sheet into a neutral grid aligned with the sheet's own rows and
/// columns.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<RawSheet, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let names = workbook.sheet_names().to_vec();
    if !names.iter().any(|n| n == sheet) {
        return Err(LoadError::MissingSheet {
            path: path.display().to_string(),
            sheet: sheet.to_string(),
            available: names.join(", "),
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| LoadError::Read {
            sheet: sheet.to_string(),
            reason: e.to_string(),
        })?;

    let (height, width) = range.get_size();
    tracing::info!(sheet, rows = height, columns = width, start = ?range.start(), "read sheet");

    Ok(range_to_sheet(sheet, &range))
}

/// Identity of one loaded sheet. The file's modification time is part of the
/// key, so a new version of the workbook is loaded afresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetKey {
    pub path: PathBuf,
    pub sheet: String,
    pub modified: Option<SystemTime>,
}

impl SheetKey {
    pub fn for_file(path: &Path, sheet: &str) -> Self {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Self {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            modified,
        }
    }
}

type Slot<V> = Arc<OnceCell<Result<Arc<V>, LoadError>>>;

/// Compute-if-absent cache: each key's loader runs at most once, even with
/// concurrent callers; later callers block until the first one finishes and
/// share its result, failures included.
pub struct LoadCache<V> {
    slots: Mutex<HashMap<SheetKey, Slot<V>>>,
}

impl<V> Default for LoadCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> LoadCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<F>(&self, key: SheetKey, load: F) -> Result<Arc<V>, LoadError>
    where
        F: FnOnce() -> Result<V, LoadError>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };
        slot.get_or_init(|| load().map(Arc::new)).clone()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LoadCache<RawSheet> {
    /// Read a sheet through the cache.
    pub fn sheet(&self, path: &Path, sheet: &str) -> Result<Arc<RawSheet>, LoadError> {
        self.get_or_load(SheetKey::for_file(path, sheet), || read_sheet(path, sheet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::RateCalendar;
    use crate::sheets::parse_rate_matrix;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(sheet: &str) -> SheetKey {
        SheetKey {
            path: PathBuf::from("data/vs_code.xlsx"),
            sheet: sheet.to_string(),
            modified: None,
        }
    }

    #[test]
    fn test_missing_workbook_is_open_error() {
        let err = read_sheet(Path::new("does/not/exist.xlsx"), "anual").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn test_malformed_workbook_is_open_error() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"definitely not a zip archive").unwrap();
        let err = read_sheet(file.path(), "anual").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    fn range_at(start: (u32, u32), cells: &[&[&str]]) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new(start, (start.0 + height - 1, start.1 + width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                range.set_value(
                    (start.0 + r as u32, start.1 + c as u32),
                    Data::String(value.to_string()),
                );
            }
        }
        range
    }

    #[test]
    fn test_rate_sheet_with_blank_first_row_keeps_every_province() {
        let range = range_at((1, 0), &[&["Buenos Aires", "2,1%"], &["Salta", "3,0%"]]);
        let sheet = range_to_sheet("art", &range);
        assert_eq!(sheet.rows.len(), 3);
        assert!(sheet.rows[0].is_empty());

        let obs = parse_rate_matrix(&sheet, &RateCalendar::default(), "Alícuota promedio ART");
        let provinces: Vec<&str> = obs.iter().map(|o| o.province.as_str()).collect();
        assert_eq!(provinces, vec!["Buenos Aires", "Salta"]);
        assert_eq!(obs[0].period, "nov-20");
        assert_eq!(obs[0].value, Some(2.1));
    }

    #[test]
    fn test_range_offset_restores_columns() {
        let range = range_at((0, 2), &[&["Provincia", "Variable"]]);
        let sheet = range_to_sheet("anual", &range);
        assert_eq!(
            sheet.rows[0],
            vec![
                Cell::Empty,
                Cell::Empty,
                Cell::Text("Provincia".into()),
                Cell::Text("Variable".into()),
            ]
        );
    }

    #[test]
    fn test_cache_loads_once_per_key() {
        let cache: LoadCache<usize> = LoadCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..5 {
            let v = cache
                .get_or_load(key("anual"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_once_under_concurrency() {
        let cache: LoadCache<String> = LoadCache::new();
        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let v = cache
                        .get_or_load(key("trim"), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok("cargado".to_string())
                        })
                        .unwrap();
                    assert_eq!(v.as_str(), "cargado");
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_memoizes_failures() {
        let cache: LoadCache<u8> = LoadCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let result = cache.get_or_load(key("art"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LoadError::Read {
                    sheet: "art".into(),
                    reason: "broken".into(),
                })
            });
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_keys_are_independent() {
        let cache: LoadCache<&'static str> = LoadCache::new();
        let a = cache.get_or_load(key("anual"), || Ok("a")).unwrap();
        let b = cache.get_or_load(key("trim"), || Ok("b")).unwrap();
        assert_eq!((*a, *b), ("a", "b"));

        let mut newer = key("anual");
        newer.modified = Some(SystemTime::UNIX_EPOCH);
        let c = cache.get_or_load(newer, || Ok("c")).unwrap();
        assert_eq!(*c, "c");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_sheet_through_cache_reports_missing_file() {
        let cache: LoadCache<RawSheet> = LoadCache::new();
        let first = cache.sheet(Path::new("nope.xlsx"), "anual");
        let second = cache.sheet(Path::new("nope.xlsx"), "anual");
        assert!(first.is_err());
        assert_eq!(first.unwrap_err(), second.unwrap_err());
        assert_eq!(cache.len(), 1);
    }
}
