//! Header Locator - maps semantic fields to column indices.
//!
//! The daily report has no stable schema: header text wraps across lines,
//! moves between rows and is sometimes missing entirely. Columns are found
//! by alias matching over the top rows, and when that fails, by ranking
//! columns on how many numbers they hold.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::HeaderNotFoundError;
use crate::grid::{Cell, ReportGrid};
use crate::normalize::{clean_text, parse_number};
use crate::refdata::contains_token;

/// Rows scanned for header text.
pub const HEADER_SEARCH_ROWS: usize = 14;

/// A header row must match more than this many fields to be canonical.
const HEADER_ROW_THRESHOLD: usize = 2;

/// First data row considered by the numeric-density fallback.
const DENSITY_SCAN_START: usize = 12;

/// Last data row (exclusive) considered by the numeric-density fallback.
const DENSITY_SCAN_END: usize = 150;

/// Minimum count of numbers for a column to be a capacity candidate.
const DENSITY_MIN_NUMBERS: usize = 3;

/// Rows scanned when choosing the plant-name column.
const LABEL_SCAN_ROWS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    MonitoredCapacity,
    TargetGeneration,
    ActualGeneration,
    CoalStockDays,
    OutageCapacity,
    OutageDate,
    ExpectedSyncDate,
    Remarks,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::MonitoredCapacity,
        Field::TargetGeneration,
        Field::ActualGeneration,
        Field::CoalStockDays,
        Field::OutageCapacity,
        Field::OutageDate,
        Field::ExpectedSyncDate,
        Field::Remarks,
    ];

    /// Fields whose absence triggers the numeric-density fallback.
    pub const ESSENTIAL: [Field; 3] = [
        Field::MonitoredCapacity,
        Field::TargetGeneration,
        Field::ActualGeneration,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::MonitoredCapacity => "monitored-capacity",
            Field::TargetGeneration => "target-generation",
            Field::ActualGeneration => "actual-generation",
            Field::CoalStockDays => "coal-stock-days",
            Field::OutageCapacity => "outage-capacity",
            Field::OutageDate => "outage-date",
            Field::ExpectedSyncDate => "expected-sync-date",
            Field::Remarks => "remarks",
        }
    }

    /// Header aliases, upper case with line breaks flattened.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::MonitoredCapacity => &["MONITORED CAP", "MONITORED CAPACITY"],
            Field::TargetGeneration => &["TODAY'S PROGRAM", "TODAYS PROGRAM", "PROGRAMME"],
            Field::ActualGeneration => &["TODAY'S ACTUAL", "TODAYS ACTUAL"],
            Field::CoalStockDays => &["COAL STOCK IN DAYS", "COAL STOCK"],
            Field::OutageCapacity => &["CAP. UNDER OUTAGE", "CAPACITY UNDER OUTAGE"],
            Field::OutageDate => &["OUTAGE DATE", "DATE OF OUTAGE"],
            Field::ExpectedSyncDate => &["EXPECTED DATE", "SYNC. DATE", "EXPECTED DATE /"],
            Field::Remarks => &["REMARKS"],
        }
    }

    /// Column offset from monitored capacity in the standard layout, used
    /// when header text is missing.
    fn fallback_offset(self) -> usize {
        match self {
            Field::MonitoredCapacity => 0,
            Field::TargetGeneration => 1,
            Field::ActualGeneration => 2,
            Field::CoalStockDays => 5,
            Field::OutageCapacity => 7,
            Field::OutageDate => 8,
            Field::ExpectedSyncDate => 10,
            Field::Remarks => 11,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How much the column mapping can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Every essential field was found by header text.
    Headers,
    /// At least one essential field was guessed from numeric density and
    /// fixed offsets.
    NumericFallback,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Headers => "headers",
            Confidence::NumericFallback => "numeric-fallback",
        }
    }
}

/// Resolved field → column mapping for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    columns: BTreeMap<Field, usize>,
    /// Column holding plant names and unit markers.
    pub label_col: usize,
    /// Row chosen as the canonical header row, if any.
    pub header_row: Option<usize>,
    pub confidence: Confidence,
}

impl HeaderMap {
    /// Build a mapping directly; used for layouts known in advance.
    pub fn with_columns(
        columns: impl IntoIterator<Item = (Field, usize)>,
        label_col: usize,
        header_row: Option<usize>,
    ) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            label_col,
            header_row,
            confidence: Confidence::Headers,
        }
    }

    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// The cell of `field` in `row`, blank when the field is unmapped.
    pub fn cell<'g>(&self, grid: &'g ReportGrid, row: usize, field: Field) -> &'g Cell {
        match self.column(field) {
            Some(col) => grid.get(row, col),
            None => grid.get(usize::MAX, usize::MAX),
        }
    }

    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| !self.columns.contains_key(f))
            .collect()
    }

    /// First row after the header block.
    pub fn data_start(&self) -> usize {
        self.header_row.map(|r| r + 1).unwrap_or(0)
    }
}

// =============================================================================
// Alias matching
// =============================================================================

fn upper_cell(grid: &ReportGrid, row: usize, col: usize) -> String {
    clean_text(grid.get(row, col)).to_uppercase()
}

/// Short aliases match anywhere; longer ones must stand as whole tokens.
fn alias_matches(cell_upper: &str, alias: &str) -> bool {
    if alias.len() > 3 {
        contains_token(cell_upper, alias)
    } else {
        cell_upper.contains(alias)
    }
}

fn row_score(grid: &ReportGrid, row: usize) -> usize {
    let cells: Vec<String> = (0..grid.width())
        .map(|c| upper_cell(grid, row, c))
        .filter(|s| !s.is_empty())
        .collect();
    Field::ALL
        .iter()
        .filter(|field| {
            field
                .aliases()
                .iter()
                .any(|alias| cells.iter().any(|cell| cell.contains(alias)))
        })
        .count()
}

/// Pick the canonical header row: the best-scoring row in the search window
/// when its score clears the threshold.
fn canonical_header_row(grid: &ReportGrid) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for r in 0..grid.height().min(HEADER_SEARCH_ROWS) {
        let score = row_score(grid, r);
        if score > HEADER_ROW_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((r, score));
        }
    }
    best.map(|(r, _)| r)
}

fn match_aliases(grid: &ReportGrid, rows: &[usize]) -> BTreeMap<Field, usize> {
    let mut found = BTreeMap::new();
    'rows: for &r in rows {
        for c in 0..grid.width() {
            let cell = upper_cell(grid, r, c);
            if cell.is_empty() {
                continue;
            }
            for field in Field::ALL {
                if found.contains_key(&field) {
                    continue;
                }
                if field.aliases().iter().any(|a| alias_matches(&cell, a)) {
                    found.insert(field, c);
                }
            }
            if found.len() == Field::ALL.len() {
                break 'rows;
            }
        }
    }
    found
}

// =============================================================================
// Column heuristics
// =============================================================================

/// Choose the column holding plant names: the column with the most
/// text-bearing cells, preferring the first two columns.
pub fn locate_label_column(grid: &ReportGrid, start_row: usize) -> usize {
    let end = grid.height().min(start_row + LABEL_SCAN_ROWS);
    let mut scores: Vec<(usize, usize)> = (0..grid.width())
        .map(|c| {
            let score = (start_row..end)
                .filter(|&r| match grid.get(r, c) {
                    Cell::Text(s) => s.chars().count() > 2 && s.chars().any(char::is_alphabetic),
                    _ => false,
                })
                .count();
            (c, score)
        })
        .collect();
    // Stable: ties keep the leftmost column first.
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    match scores.first() {
        Some(&(0, score)) if score > 10 => 0,
        _ => scores
            .iter()
            .find(|(c, _)| *c <= 1)
            .or_else(|| scores.iter().find(|(c, s)| *c > 2 && *s > 0))
            .map(|(c, _)| *c)
            .unwrap_or(0),
    }
}

/// Rank columns by how many parsable numbers they hold in the data rows
/// and return the best non-label column.
fn densest_numeric_column(grid: &ReportGrid, label_col: usize) -> Option<usize> {
    let end = grid.height().min(DENSITY_SCAN_END);
    let mut counts: Vec<(usize, usize)> = (0..grid.width())
        .map(|c| {
            let n = (DENSITY_SCAN_START..end)
                .filter(|&r| parse_number(grid.get(r, c)).is_some())
                .count();
            (c, n)
        })
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .iter()
        .find(|(c, n)| *c != 0 && *c != label_col && *n > DENSITY_MIN_NUMBERS)
        .or_else(|| counts.iter().find(|(c, _)| *c != label_col))
        .map(|(c, _)| *c)
}

/// Locate every semantic field in a daily report grid.
///
/// Fails only when monitored capacity stays unmapped after the fallback.
pub fn locate(grid: &ReportGrid) -> Result<HeaderMap, HeaderNotFoundError> {
    let header_row = canonical_header_row(grid);
    let window = grid.height().min(HEADER_SEARCH_ROWS);
    let search_rows: Vec<usize> = match header_row {
        // Wrapped headers spill into the following row.
        Some(r) if r + 1 < window => vec![r, r + 1],
        Some(r) => vec![r],
        None => (0..window).collect(),
    };
    let mut columns = match_aliases(grid, &search_rows);

    let scan_start = header_row.map(|r| r + 1).unwrap_or(10);
    let label_col = locate_label_column(grid, scan_start);

    let mut confidence = Confidence::Headers;
    if Field::ESSENTIAL.iter().any(|f| !columns.contains_key(f)) {
        confidence = Confidence::NumericFallback;
        if let Some(base) = columns
            .get(&Field::MonitoredCapacity)
            .copied()
            .or_else(|| densest_numeric_column(grid, label_col))
        {
            for field in Field::ALL {
                let col = base + field.fallback_offset();
                if col < grid.width() {
                    columns.entry(field).or_insert(col);
                }
            }
        }
    }

    if !columns.contains_key(&Field::MonitoredCapacity) {
        return Err(HeaderNotFoundError {
            missing: vec![Field::MonitoredCapacity.key()],
        });
    }

    Ok(HeaderMap {
        columns,
        label_col,
        header_row,
        confidence,
    })
}

/// Find a column by synonym in a header row: exact (case-insensitive) match
/// first, then substring.
pub fn pick_column(headers: &[String], synonyms: &[&str]) -> Option<usize> {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    synonyms
        .iter()
        .find_map(|s| {
            let s = s.to_lowercase();
            lowered.iter().position(|h| *h == s)
        })
        .or_else(|| {
            lowered.iter().position(|h| {
                !h.is_empty() && synonyms.iter().any(|s| h.contains(&s.to_lowercase()))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_header() -> Vec<&'static str> {
        vec![
            "NAME OF STATION",
            "MONITORED\nCAPACITY (MW)",
            "TODAY'S\nPROGRAM",
            "TODAY'S\nACTUAL",
            "",
            "",
            "COAL STOCK\nIN DAYS",
            "",
            "CAP. UNDER\nOUTAGE",
            "OUTAGE DATE",
            "",
            "EXPECTED DATE / SYNC. DATE",
            "REMARKS",
        ]
    }

    #[test]
    fn test_locate_by_header_text() {
        let mut rows = vec![vec!["DAILY GENERATION REPORT"], vec![""]];
        rows.push(standard_header());
        rows.push(vec!["RAJASTHAN"]);
        rows.push(vec!["KOTA TPS", "1240", "20", "18.5"]);
        let grid = ReportGrid::from_strings(rows);

        let map = locate(&grid).unwrap();
        assert_eq!(map.header_row, Some(2));
        assert_eq!(map.column(Field::MonitoredCapacity), Some(1));
        assert_eq!(map.column(Field::TargetGeneration), Some(2));
        assert_eq!(map.column(Field::ActualGeneration), Some(3));
        assert_eq!(map.column(Field::CoalStockDays), Some(6));
        assert_eq!(map.column(Field::OutageCapacity), Some(8));
        assert_eq!(map.column(Field::OutageDate), Some(9));
        assert_eq!(map.column(Field::ExpectedSyncDate), Some(11));
        assert_eq!(map.column(Field::Remarks), Some(12));
        assert_eq!(map.label_col, 0);
        assert_eq!(map.confidence, Confidence::Headers);
    }

    #[test]
    fn test_header_split_across_two_rows() {
        let grid = ReportGrid::from_strings(vec![
            vec!["STATION", "MONITORED CAPACITY", "TODAY'S PROGRAM", "TODAY'S ACTUAL", ""],
            vec!["", "", "", "", "REMARKS"],
            vec!["ALPHA TPS", "500", "450", "420", ""],
        ]);
        let map = locate(&grid).unwrap();
        assert_eq!(map.header_row, Some(0));
        assert_eq!(map.column(Field::Remarks), Some(4));
        assert_eq!(
            map.missing(),
            vec![
                Field::CoalStockDays,
                Field::OutageCapacity,
                Field::OutageDate,
                Field::ExpectedSyncDate,
            ]
        );
    }

    #[test]
    fn test_numeric_density_fallback() {
        let mut rows: Vec<Vec<String>> = (0..12).map(|_| vec![String::new()]).collect();
        for i in 0..20 {
            rows.push(vec![
                format!("PLANT {i}"),
                format!("{}", 100 + i),
                format!("{}", 90 + i),
                format!("{}", 80 + i),
            ]);
        }
        let grid = ReportGrid::from_strings(rows);

        let map = locate(&grid).unwrap();
        assert_eq!(map.confidence, Confidence::NumericFallback);
        assert_eq!(map.column(Field::MonitoredCapacity), Some(1));
        assert_eq!(map.column(Field::TargetGeneration), Some(2));
        assert_eq!(map.column(Field::ActualGeneration), Some(3));
        // Beyond the grid's width: left unmapped rather than invented.
        assert_eq!(map.column(Field::Remarks), None);
    }

    #[test]
    fn test_no_capacity_column_is_header_not_found() {
        let grid = ReportGrid::from_strings(vec![vec!["NOTES ONLY"], vec!["NOTHING HERE"]]);
        let err = locate(&grid).unwrap_err();
        assert_eq!(err.missing, vec!["monitored-capacity"]);
    }

    #[test]
    fn test_label_column_prefers_first_columns() {
        let mut rows = Vec::new();
        for i in 0..15 {
            rows.push(vec![format!("{i}"), format!("STATION NUMBER {i}"), "10".to_string()]);
        }
        let grid = ReportGrid::from_strings(rows);
        assert_eq!(locate_label_column(&grid, 0), 1);
    }

    #[test]
    fn test_pick_column_exact_then_partial() {
        let headers: Vec<String> = ["Station", "State / Region", "Operational Capacity (MW)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(pick_column(&headers, &["State / Region", "State"]), Some(1));
        assert_eq!(pick_column(&headers, &["Operational Capacity"]), Some(2));
        assert_eq!(pick_column(&headers, &["Efficiency"]), None);
    }
}
