//! Renewable generation reports: state summary and per-station detail.
//!
//! Reports arrive either as a two-sheet workbook (summary + stations) or as
//! the original PDF, whose first page holds the state summary table and
//! whose later pages hold station tables. State names are bilingual and
//! are reduced to their Latin-script part before lookup.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::grid::{Cell, ReportGrid};
use crate::header::pick_column;
use crate::identity::PlantRegistry;
use crate::model::{FileBatch, MeasurementScope, PlantRecord, ProductionLog, Unresolved};
use crate::normalize::{clean_text, parse_number};
use crate::refdata::{
    lookup_ci, state_alias, state_code, BILINGUAL_STATE_NAMES, RENEWABLE_SECTORS, RENEWABLE_TYPES,
};

static LATIN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z&\-.()\s]+").expect("valid regex"));

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Row names that are aggregates, not states or stations.
const JUNK_NAMES: &[&str] = &[
    "total",
    "region",
    "summary",
    "all india",
    "north east",
    "north west",
    "south east",
    "south west",
];

const STATION_SHEET_KEYWORDS: &[&str] = &["station", "plant", "details"];
const SUMMARY_SHEET_KEYWORDS: &[&str] = &["summary", "state", "region"];

const STATE_COLUMN: &[&str] = &["State / Region", "State", "State Name"];
const OTHERS_COLUMN: &[&str] = &[
    "Others RES",
    "Others RES (MU)",
    "Biomass (MU)",
    "Others",
    "Total (MU)",
    "Generation (MU)",
];
const GENERATION_COLUMN: &[&str] = &[
    "Generation (MU)",
    "Daily Generation (MU)",
    "Total (MU)",
    "RE Generation (MU)",
];
const STATION_COLUMN: &[&str] = &[
    "Station",
    "Station Name",
    "Plant",
    "Plant Name",
    "Station/ Plant",
];
const CAPACITY_COLUMN: &[&str] = &[
    "Operational Capacity (MW)",
    "Operational Capacity",
    "Capacity (MW)",
];
const ACTUAL_COLUMN: &[&str] = &[
    "Actual Generation (MU)",
    "Actual Generation",
    "Todays Actual (MU)",
    "Generation (MU)",
];
const CAPABLE_COLUMN: &[&str] = &["Capable Generation (MU)", "Capable Generation"];
const EFFICIENCY_COLUMN: &[&str] = &["Efficiency (%)", "Efficiency"];
const SECTOR_COLUMN: &[&str] = &["Sector", "Sector Name"];
const TYPE_COLUMN: &[&str] = &["Type", "Plant Type", "Technology"];

/// Column layout of the PDF summary table.
const SUMMARY_LAYOUT: &[&str] = &["State / Region", "Wind", "Solar", "Others RES", "Total"];

/// Column layout of the PDF station tables.
const STATION_LAYOUT: &[&str] = &[
    "Station",
    "State / Region",
    "Sector",
    "Owner",
    "Type",
    "Operational Capacity (MW)",
    "Actual Generation (MU)",
];

/// Sector and type of the synthetic per-state biomass plant.
const SUMMARY_PLANT_SECTOR: &str = "CCT";
const SUMMARY_PLANT_TYPE: &str = "BIO";

// =============================================================================
// State names
// =============================================================================

/// Reduce a bilingual state label to its English part.
///
/// Known labels are translated through a dictionary; otherwise the last
/// slash-separated part with Latin letters is kept, and from it the first
/// run of Latin characters.
pub fn clean_state_name(raw: &str) -> Option<String> {
    let s = raw.replace(['\r', '\n'], " ");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some((_, english)) = BILINGUAL_STATE_NAMES.iter().find(|(hindi, _)| s.contains(hindi)) {
        return Some(english.to_string());
    }

    let part = if s.contains('/') {
        let parts: Vec<&str> = s.split('/').map(str::trim).filter(|p| !p.is_empty()).collect();
        parts
            .iter()
            .rev()
            .find(|p| p.chars().any(|c| c.is_ascii_alphabetic()))
            .or(parts.last())
            .copied()
            .unwrap_or(s)
    } else {
        s
    };

    let extracted = LATIN_RUN
        .find_iter(part)
        .map(|m| m.as_str().trim())
        .find(|m| m.chars().any(|c| c.is_ascii_alphabetic()))?;
    let collapsed = MULTI_SPACE.replace_all(extracted, " ").into_owned();
    match collapsed.as_str() {
        "" | "-" => None,
        _ if collapsed.eq_ignore_ascii_case("nan") => None,
        _ => Some(collapsed),
    }
}

/// Resolve a cleaned state name to its code: canonical table first, then
/// the alias table.
pub fn resolve_state(name: &str) -> Option<&'static str> {
    let normalized: String = name
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect();
    state_code(&normalized).or_else(|| state_alias(&normalized).and_then(state_code))
}

/// Aggregate rows (totals, regions, all-India) carry no single state or
/// station.
pub fn is_junk_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    matches!(lower.as_str(), "" | "-" | "--" | "nan")
        || JUNK_NAMES.iter().any(|k| lower.contains(k))
}

// =============================================================================
// Tables
// =============================================================================

/// Pick the station and summary sheets by name, defaulting to the first
/// and last sheet.
pub fn detect_sheets(names: &[String]) -> (usize, usize) {
    let find = |keywords: &[&str]| {
        names.iter().rposition(|n| {
            let lower = n.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
    };
    let station = find(STATION_SHEET_KEYWORDS).unwrap_or(0);
    let summary = find(SUMMARY_SHEET_KEYWORDS).unwrap_or(names.len().saturating_sub(1));
    (station, summary)
}

/// A grid whose first row is the header row.
struct Table<'a> {
    grid: &'a ReportGrid,
    headers: Vec<String>,
}

impl<'a> Table<'a> {
    fn new(grid: &'a ReportGrid) -> Self {
        let headers = grid.row(0).iter().map(clean_text).collect();
        Self { grid, headers }
    }

    fn column(&self, synonyms: &[&str]) -> Option<usize> {
        pick_column(&self.headers, synonyms)
    }

    fn text(&self, row: usize, col: Option<usize>) -> String {
        col.map(|c| clean_text(self.grid.get(row, c))).unwrap_or_default()
    }

    fn number(&self, row: usize, col: Option<usize>) -> Option<f64> {
        col.and_then(|c| parse_number(self.grid.get(row, c)))
    }

    fn data_rows(&self) -> std::ops::Range<usize> {
        1..self.grid.height()
    }
}

/// Summary rows: the "others" (biomass) figure becomes the generation of a
/// per-state `Biomass_<STATE>` plant.
pub fn summary_rows(grid: &ReportGrid, registry: &mut PlantRegistry, batch: &mut FileBatch) {
    let table = Table::new(grid);
    let Some(state_col) = table.column(STATE_COLUMN) else {
        tracing::warn!("summary table has no state column");
        return;
    };
    let others_col = table.column(OTHERS_COLUMN);
    let generation_col = table.column(GENERATION_COLUMN);

    for r in table.data_rows() {
        let Some(name) = clean_state_name(&table.text(r, Some(state_col))) else {
            continue;
        };
        if is_junk_name(&name) {
            batch.skipped_rows += 1;
            continue;
        }
        let Some(code) = resolve_state(&name) else {
            batch.unresolved.push(Unresolved { row: r, name });
            batch.skipped_rows += 1;
            continue;
        };
        let Some(actual) = table
            .number(r, others_col)
            .or_else(|| table.number(r, generation_col))
        else {
            batch.skipped_rows += 1;
            continue;
        };

        let plant_name = format!("Biomass_{code}");
        let (plant_id, _) = registry.resolve(&plant_name, code);
        batch.plants.push(PlantRecord {
            id: plant_id,
            name: plant_name,
            state: code.to_string(),
            sector: Some(SUMMARY_PLANT_SECTOR.to_string()),
            energy_type: Some(SUMMARY_PLANT_TYPE.to_string()),
        });
        batch.production.push(ProductionLog {
            plant_id,
            date: batch.report_date,
            capacity_mw: None,
            actual_mu: Some(actual),
            target_mu: None,
            coal_stock_days: None,
            efficiency_pct: None,
            scope: MeasurementScope::GenerationOnly,
        });
    }
}

/// Station rows: one plant and production log per station with any
/// numeric payload.
pub fn station_rows(grid: &ReportGrid, registry: &mut PlantRegistry, batch: &mut FileBatch) {
    let table = Table::new(grid);
    let Some(station_col) = table.column(STATION_COLUMN) else {
        tracing::warn!("station table has no station column");
        return;
    };
    let state_col = table.column(STATE_COLUMN);
    let capacity_col = table.column(CAPACITY_COLUMN);
    let actual_col = table.column(ACTUAL_COLUMN);
    let capable_col = table.column(CAPABLE_COLUMN);
    let efficiency_col = table.column(EFFICIENCY_COLUMN);
    let sector_col = table.column(SECTOR_COLUMN);
    let type_col = table.column(TYPE_COLUMN);

    for r in table.data_rows() {
        let station = table.text(r, Some(station_col));
        if is_junk_name(&station) {
            batch.skipped_rows += 1;
            continue;
        }
        let raw_state = table.text(r, state_col);
        let Some(code) = clean_state_name(&raw_state).as_deref().and_then(resolve_state) else {
            batch.unresolved.push(Unresolved {
                row: r,
                name: if raw_state.is_empty() { station } else { raw_state },
            });
            batch.skipped_rows += 1;
            continue;
        };

        let capacity = table.number(r, capacity_col);
        let actual = table.number(r, actual_col);
        let capable = table.number(r, capable_col);
        let efficiency = table.number(r, efficiency_col);
        if [capacity, actual, capable, efficiency].iter().all(Option::is_none) {
            batch.skipped_rows += 1;
            continue;
        }

        let (plant_id, _) = registry.resolve(&station, code);
        batch.plants.push(PlantRecord {
            id: plant_id,
            name: station,
            state: code.to_string(),
            sector: lookup_ci(RENEWABLE_SECTORS, &table.text(r, sector_col)).map(str::to_string),
            energy_type: lookup_ci(RENEWABLE_TYPES, &table.text(r, type_col)).map(str::to_string),
        });
        batch.production.push(ProductionLog {
            plant_id,
            date: batch.report_date,
            capacity_mw: capacity,
            actual_mu: actual,
            target_mu: capable,
            coal_stock_days: None,
            efficiency_pct: efficiency,
            scope: MeasurementScope::Station,
        });
    }
}

/// Parse a renewable workbook's sheets into one batch.
pub fn workbook_batch(
    sheets: &[(String, ReportGrid)],
    report_date: NaiveDate,
    registry: &mut PlantRegistry,
) -> FileBatch {
    let mut batch = FileBatch::new(report_date);
    if sheets.is_empty() {
        return batch;
    }
    let names: Vec<String> = sheets.iter().map(|(name, _)| name.clone()).collect();
    let (station, summary) = detect_sheets(&names);
    tracing::debug!(station = %names[station], summary = %names[summary], "detected sheets");

    summary_rows(&sheets[summary].1, registry, &mut batch);
    if station != summary {
        station_rows(&sheets[station].1, registry, &mut batch);
    }
    batch
}

/// Give a PDF table a header row: keep its own when it has one, otherwise
/// assume the fixed layout.
fn with_layout(grid: &ReportGrid, layout: &[&str], key: &[&str]) -> ReportGrid {
    let headers: Vec<String> = grid.row(0).iter().map(clean_text).collect();
    if pick_column(&headers, key).is_some() {
        return grid.clone();
    }
    let mut rows = vec![layout.iter().map(Cell::text).collect::<Vec<_>>()];
    rows.extend(grid.rows().map(<[Cell]>::to_vec));
    ReportGrid::new(rows)
}

/// Parse the tables of a renewable PDF, page by page.
pub fn pdf_batch(
    pages: &[Vec<ReportGrid>],
    report_date: NaiveDate,
    registry: &mut PlantRegistry,
) -> FileBatch {
    let mut batch = FileBatch::new(report_date);
    let Some((summary_page, station_pages)) = pages.split_first() else {
        return batch;
    };
    for table in summary_page {
        summary_rows(&with_layout(table, SUMMARY_LAYOUT, STATE_COLUMN), registry, &mut batch);
    }
    for table in station_pages.iter().flatten() {
        station_rows(&with_layout(table, STATION_LAYOUT, STATION_COLUMN), registry, &mut batch);
    }
    batch
}
