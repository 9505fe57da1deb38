//! Grid Reader - decodes one source document into a uniform 2-D grid.
//!
//! Source files are produced by hand and inconsistently encoded: `.xls`
//! files that are really `.xlsx`, spreadsheets exported as tab-separated
//! text, Windows-1252 text. Each decoding strategy is tried in priority
//! order and the first one that parses wins.

use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, open_workbook_auto, Data, Range, Reader, Xls, Xlsx};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::ReadError;

/// One raw cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Build a text cell, collapsing blank strings to `Empty`.
    pub fn text(s: impl AsRef<str>) -> Cell {
        let cleaned = s.as_ref().replace('\u{a0}', " ");
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string().to_uppercase()),
            // Serial day number; the date normalizer converts it.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        }
    }
}

static EMPTY: Cell = Cell::Empty;

/// Ordered 2-D array of raw cells, indexed by (row, column).
///
/// Rows are padded to a common width so every (row, column) inside the
/// grid is addressable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportGrid {
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl ReportGrid {
    pub fn new(mut rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, Cell::Empty);
        }
        Self { rows, width }
    }

    /// Convenience constructor for literal grids: blank strings become
    /// empty cells, anything that parses as a plain number becomes a number.
    pub fn from_strings<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| {
                        let s = s.as_ref().trim();
                        match s.parse::<f64>() {
                            Ok(n) if n.is_finite() => Cell::Number(n),
                            _ => Cell::text(s),
                        }
                    })
                    .collect()
            })
            .collect();
        Self::new(rows)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Cell rendered as trimmed text; empty string for blanks.
    pub fn text(&self, row: usize, col: usize) -> String {
        self.get(row, col).to_string()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    fn from_range(range: &Range<Data>) -> Self {
        let (row0, col0) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<Cell>> = (0..row0).map(|_| Vec::new()).collect();
        for r in range.rows() {
            let mut cells = vec![Cell::Empty; col0 as usize];
            cells.extend(r.iter().map(Cell::from));
            rows.push(cells);
        }
        Self::new(rows)
    }
}

// =============================================================================
// Decoding strategies
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Xls,
    Xlsx,
    Auto,
    DelimitedText,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Xls => "xls",
            Strategy::Xlsx => "xlsx",
            Strategy::Auto => "auto",
            Strategy::DelimitedText => "delimited-text",
        }
    }

    /// Format-appropriate strategy first, generic fallbacks after.
    fn for_path(path: &Path) -> &'static [Strategy] {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xls") => &[Strategy::Xls, Strategy::Auto, Strategy::DelimitedText],
            Some("xlsx") => &[Strategy::Xlsx, Strategy::Auto, Strategy::DelimitedText],
            _ => &[Strategy::Auto, Strategy::DelimitedText],
        }
    }

    fn decode_sheets(self, path: &Path) -> Result<Vec<(String, ReportGrid)>, String> {
        match self {
            Strategy::Xls => {
                let mut wb: Xls<_> = open_workbook::<Xls<_>, _>(path).map_err(|e| e.to_string())?;
                sheets_of(&mut wb)
            }
            Strategy::Xlsx => {
                let mut wb: Xlsx<_> = open_workbook::<Xlsx<_>, _>(path).map_err(|e| e.to_string())?;
                sheets_of(&mut wb)
            }
            Strategy::Auto => {
                let mut wb = open_workbook_auto(path).map_err(|e| e.to_string())?;
                sheets_of(&mut wb)
            }
            Strategy::DelimitedText => {
                let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
                let grid = parse_delimited(&bytes)?;
                Ok(vec![("text".to_string(), grid)])
            }
        }
    }
}

fn sheets_of<RS, R>(workbook: &mut R) -> Result<Vec<(String, ReportGrid)>, String>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: fmt::Display,
{
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name).map_err(|e| e.to_string())?;
        sheets.push((name, ReportGrid::from_range(&range)));
    }
    Ok(sheets)
}

fn read_with_strategies(path: &Path) -> Result<Vec<(String, ReportGrid)>, ReadError> {
    if !path.exists() {
        return Err(ReadError::NotFound(path.to_path_buf()));
    }
    let mut attempts = Vec::new();
    for &strategy in Strategy::for_path(path) {
        tracing::debug!(path = %path.display(), strategy = strategy.name(), "trying decoder");
        match strategy.decode_sheets(path) {
            Ok(sheets) if sheets.is_empty() => {
                return Err(ReadError::NoSheets {
                    path: path.to_path_buf(),
                })
            }
            Ok(sheets) => {
                tracing::debug!(path = %path.display(), strategy = strategy.name(), "decoded");
                return Ok(sheets);
            }
            Err(e) => attempts.push((strategy.name(), e)),
        }
    }
    Err(ReadError::Exhausted {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Read the first sheet of a daily report.
pub fn read_report(path: &Path) -> Result<ReportGrid, ReadError> {
    read_with_strategies(path)?
        .into_iter()
        .next()
        .map(|(_, grid)| grid)
        .ok_or_else(|| ReadError::NoSheets {
            path: path.to_path_buf(),
        })
}

/// Read every sheet of a workbook, keeping sheet names.
pub fn read_workbook_sheets(path: &Path) -> Result<Vec<(String, ReportGrid)>, ReadError> {
    read_with_strategies(path)
}

// =============================================================================
// Delimited text fallback
// =============================================================================

fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text.lines().take(20).collect();
    [b'\t', b';', b',', b'|']
        .into_iter()
        .max_by_key(|d| {
            sample
                .iter()
                .map(|line| line.bytes().filter(|b| b == d).count())
                .sum::<usize>()
        })
        .unwrap_or(b',')
}

fn parse_delimited(bytes: &[u8]) -> Result<ReportGrid, String> {
    if bytes.iter().take(512).any(|&b| b == 0) {
        return Err("binary content".to_string());
    }
    let text = decode_text(bytes);
    if text.trim_start().starts_with('<') {
        return Err("markup content".to_string());
    }
    let delimiter = sniff_delimiter(&text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    // Numbers stay text here; the value normalizer handles both forms.
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(Cell::text).collect::<Vec<_>>());
    }
    let grid = ReportGrid::new(rows);
    if grid.height() < 2 || grid.width() < 2 {
        return Err("no tabular content".to_string());
    }
    Ok(grid)
}

// =============================================================================
// PDF tables
// =============================================================================

/// Split a text line into cells on runs of two or more spaces or tabs.
fn split_columns(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0;
    for ch in line.chars() {
        if ch == '\t' {
            spaces = 2;
            continue;
        }
        if ch == ' ' || ch == '\u{a0}' {
            spaces += 1;
            continue;
        }
        if spaces >= 2 && !current.is_empty() {
            cells.push(std::mem::take(&mut current));
        } else if spaces == 1 && !current.is_empty() {
            current.push(' ');
        }
        spaces = 0;
        current.push(ch);
    }
    if !current.is_empty() {
        cells.push(current);
    }
    cells
}

/// Group the lines of one page into table regions: each maximal run of
/// lines that have at least two columns becomes one grid.
pub fn page_tables(page_text: &str) -> Vec<ReportGrid> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<Cell>> = Vec::new();
    for line in page_text.lines() {
        let cells = split_columns(line);
        if cells.len() >= 2 {
            current.push(cells.iter().map(Cell::text).collect());
        } else {
            if current.len() >= 2 {
                tables.push(ReportGrid::new(std::mem::take(&mut current)));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        tables.push(ReportGrid::new(current));
    }
    tables
}

/// Pages that carry data. The last page of a multi-page report holds notes
/// only; a single-page report is all data.
pub fn data_pages(pages: &[String]) -> &[String] {
    match pages.len() {
        0 | 1 => pages,
        n => &pages[..n - 1],
    }
}

/// Tables of a renewable PDF report, page by page.
pub fn read_pdf_tables(path: &Path) -> Result<Vec<Vec<ReportGrid>>, ReadError> {
    if !path.exists() {
        return Err(ReadError::NotFound(path.to_path_buf()));
    }
    let exhausted = |e: String| ReadError::Exhausted {
        path: path.to_path_buf(),
        attempts: vec![("pdf", e)],
    };
    let bytes = std::fs::read(path).map_err(|e| exhausted(e.to_string()))?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| exhausted(e.to_string()))?;
    let tables: Vec<Vec<ReportGrid>> = data_pages(&pages)
        .iter()
        .map(|page| page_tables(page))
        .collect();
    if tables.iter().all(Vec::is_empty) {
        return Err(ReadError::NoTables {
            path: PathBuf::from(path),
        });
    }
    Ok(tables)
}
