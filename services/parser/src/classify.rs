//! Row Classifier - tags daily-report rows and tracks hierarchical context.
//!
//! Classification is an ordered list of predicates; the first one that
//! matches decides the row's kind. The list order is the tie-break rule:
//! state header, sector header, type header, aggregate total, unit detail,
//! plant detail, ignorable.

use std::sync::LazyLock;

use regex::Regex;

use crate::grid::ReportGrid;
use crate::header::{Field, HeaderMap};
use crate::model::PlantId;
use crate::normalize::{clean_text, is_plausible_name, parse_number};
use crate::refdata::{
    contains_state_name, contains_token, find_state, state_code, CONTEXT_KEYWORDS, SECTOR_ALIASES,
    STATES, STATE_ALIASES, TYPE_ALIASES,
};
use crate::status::UNKNOWN_UNIT;

/// A state header has fewer populated cells than this.
const STATE_HEADER_MAX_CELLS: usize = 8;

/// The state name must appear within this many leading cells.
const STATE_HEADER_LEAD_CELLS: usize = 3;

static TOTAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(STATE|REGION)\s*TOTAL\b").expect("valid regex"));

static UNIT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(UNIT[,\s]*\d+|UNIT\b)").expect("valid regex"));

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    StateHeader { code: &'static str },
    SectorHeader { sector: &'static str },
    TypeHeader { energy_type: &'static str },
    AggregateTotal,
    UnitDetail { unit: String },
    PlantDetail { name: String, capacity_mw: f64 },
    Ignorable,
}

/// Hierarchical context accumulated while walking rows top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub state: Option<&'static str>,
    pub sector: Option<&'static str>,
    pub energy_type: Option<&'static str>,
    pub plant: Option<PlantId>,
}

impl ParseContext {
    /// Advance the context for a header row. A state header clears
    /// everything below it; sector and type only replace themselves.
    pub fn enter(&mut self, kind: &RowKind) {
        match kind {
            RowKind::StateHeader { code } => {
                *self = ParseContext {
                    state: Some(*code),
                    ..ParseContext::default()
                };
            }
            RowKind::SectorHeader { sector } => self.sector = Some(*sector),
            RowKind::TypeHeader { energy_type } => self.energy_type = Some(*energy_type),
            _ => {}
        }
    }
}

/// One row prepared for classification.
#[derive(Debug)]
pub struct RowView<'a> {
    grid: &'a ReportGrid,
    header: &'a HeaderMap,
    pub index: usize,
    /// Cleaned upper-case cell texts, blanks included.
    cells: Vec<String>,
    /// Non-blank cells joined by single spaces.
    combined: String,
}

impl<'a> RowView<'a> {
    /// `None` for a row with no populated cells.
    pub fn new(grid: &'a ReportGrid, header: &'a HeaderMap, index: usize) -> Option<Self> {
        let cells: Vec<String> = grid
            .row(index)
            .iter()
            .map(|c| clean_text(c).to_uppercase())
            .collect();
        let combined = cells
            .iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if combined.is_empty() {
            return None;
        }
        Some(Self {
            grid,
            header,
            index,
            cells,
            combined,
        })
    }

    pub fn combined(&self) -> &str {
        &self.combined
    }

    fn populated(&self) -> usize {
        self.cells.iter().filter(|s| !s.is_empty()).count()
    }

    pub fn is_total(&self) -> bool {
        TOTAL_MARKER.is_match(&self.combined)
    }

    /// `REGION TOTAL` rather than `STATE TOTAL`.
    pub fn is_region_total(&self) -> bool {
        TOTAL_MARKER
            .captures(&self.combined)
            .is_some_and(|c| &c[1] == "REGION")
    }

    /// Label cell as written (cleaned, original case).
    pub fn label(&self) -> String {
        clean_text(self.grid.get(self.index, self.header.label_col))
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        parse_number(self.header.cell(self.grid, self.index, field))
    }

    /// Largest number anywhere in the row.
    pub fn max_number(&self) -> Option<f64> {
        self.grid
            .row(self.index)
            .iter()
            .filter_map(parse_number)
            .reduce(f64::max)
    }

    /// Code of a state mentioned anywhere in the row.
    pub fn state_mention(&self) -> Option<&'static str> {
        find_state(&self.combined).map(|(_, code)| code).or_else(|| {
            STATE_ALIASES
                .iter()
                .find(|(alias, _)| contains_state_name(&self.combined, alias))
                .and_then(|(_, canonical)| state_code(canonical))
        })
    }
}

// =============================================================================
// Predicates
// =============================================================================

type Predicate = fn(&RowView<'_>) -> Option<RowKind>;

/// Evaluation order; the first match wins.
const PREDICATES: &[(&str, Predicate)] = &[
    ("state-header", state_header),
    ("sector-header", sector_header),
    ("type-header", type_header),
    ("aggregate-total", aggregate_total),
    ("unit-detail", unit_detail),
    ("plant-detail", plant_detail),
];

/// Spellings a state header may use, with the state's code.
fn state_spellings() -> impl Iterator<Item = (&'static str, &'static str)> {
    STATES.iter().copied().chain(
        STATE_ALIASES
            .iter()
            .filter_map(|(alias, canonical)| state_code(canonical).map(|code| (*alias, code))),
    )
}

fn state_header(row: &RowView<'_>) -> Option<RowKind> {
    if row.is_total() || row.populated() >= STATE_HEADER_MAX_CELLS {
        return None;
    }
    state_spellings()
        .find(|(name, _)| {
            contains_state_name(&row.combined, name)
                && row
                    .cells
                    .iter()
                    .take(STATE_HEADER_LEAD_CELLS)
                    .any(|cell| contains_state_name(cell, name))
        })
        .map(|(_, code)| RowKind::StateHeader { code })
}

/// Sector and type headers carry no capacity figure.
fn is_context_candidate(row: &RowView<'_>) -> bool {
    !row.is_total() && row.number(Field::MonitoredCapacity).is_none()
}

fn sector_header(row: &RowView<'_>) -> Option<RowKind> {
    if !is_context_candidate(row) {
        return None;
    }
    SECTOR_ALIASES
        .iter()
        .find(|(alias, _)| contains_token(&row.combined, alias))
        .map(|(_, sector)| RowKind::SectorHeader { sector: *sector })
}

fn type_header(row: &RowView<'_>) -> Option<RowKind> {
    if !is_context_candidate(row) {
        return None;
    }
    TYPE_ALIASES
        .iter()
        .find(|(alias, _)| contains_token(&row.combined, alias))
        .map(|(_, energy_type)| RowKind::TypeHeader {
            energy_type: *energy_type,
        })
}

fn aggregate_total(row: &RowView<'_>) -> Option<RowKind> {
    row.is_total().then_some(RowKind::AggregateTotal)
}

fn unit_detail(row: &RowView<'_>) -> Option<RowKind> {
    let label = row.label();
    if !UNIT_MARKER.is_match(&label) {
        return None;
    }
    let unit = DIGITS
        .find(&label)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_UNIT.to_string());
    Some(RowKind::UnitDetail { unit })
}

fn plant_detail(row: &RowView<'_>) -> Option<RowKind> {
    let name = row.label();
    if !is_plausible_name(&name) || CONTEXT_KEYWORDS.contains(&name.to_uppercase().as_str()) {
        return None;
    }
    let capacity_mw = row.number(Field::MonitoredCapacity)?;
    Some(RowKind::PlantDetail { name, capacity_mw })
}

/// Classify one row. Pure: depends only on the row's content and the
/// header mapping.
pub fn classify(row: &RowView<'_>) -> RowKind {
    classify_with_rule(row).1
}

/// Classification together with the name of the predicate that decided it.
pub fn classify_with_rule(row: &RowView<'_>) -> (&'static str, RowKind) {
    PREDICATES
        .iter()
        .find_map(|(name, predicate)| predicate(row).map(|kind| (*name, kind)))
        .unwrap_or(("ignorable", RowKind::Ignorable))
}
