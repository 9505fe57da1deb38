//! Daily generation report: aggregate pass, then detail pass.
//!
//! Both passes are pure over the grid. They fill a [`FileBatch`] that the
//! store applies in one transaction.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::classify::{classify, classify_with_rule, ParseContext, RowKind, RowView};
use crate::error::HeaderNotFoundError;
use crate::grid::ReportGrid;
use crate::header::{self, Field, HeaderMap};
use crate::identity::PlantRegistry;
use crate::model::{
    FileBatch, MeasurementScope, PlantId, PlantRecord, ProductionLog, RegionField, RegionUpdate,
    StatusRecord, Unresolved,
};
use crate::normalize::{clean_text, parse_date, parse_number};
use crate::status::{infer, StatusSubject, MAIN_UNIT};

/// Import source listed among the states; never a region of its own.
const IMPORT_ONLY_STATES: &[&str] = &["BHU"];

/// Parse a daily report grid into a batch.
///
/// Fails only when the capacity column cannot be located, in which case
/// neither pass contributes anything.
pub fn build_batch(
    grid: &ReportGrid,
    report_date: NaiveDate,
    registry: &mut PlantRegistry,
) -> Result<FileBatch, HeaderNotFoundError> {
    let header = header::locate(grid)?;
    let missing = header.missing();
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.iter().map(|f| f.key()).collect();
        tracing::debug!(
            missing = ?keys,
            confidence = header.confidence.as_str(),
            "columns not mapped"
        );
    }
    let mut batch = FileBatch::new(report_date);
    batch.confidence = header.confidence;
    batch.regions = aggregate_pass(grid, &header, report_date);
    detail_pass(grid, &header, registry, &mut batch);
    Ok(batch)
}

// =============================================================================
// Aggregate pass
// =============================================================================

/// Collect per-state monitored capacity from `STATE TOTAL` / `REGION TOTAL`
/// rows. Tracks its own state context so totals placed before, after or
/// between plant rows resolve the same way.
pub fn aggregate_pass(
    grid: &ReportGrid,
    header: &HeaderMap,
    report_date: NaiveDate,
) -> Vec<RegionUpdate> {
    let mut state: Option<&'static str> = None;
    let mut totals: BTreeMap<&'static str, Option<f64>> = BTreeMap::new();

    for r in 0..grid.height() {
        let Some(row) = RowView::new(grid, header, r) else {
            continue;
        };
        match classify(&row) {
            RowKind::StateHeader { code } => state = Some(code),
            RowKind::AggregateTotal => {
                // A region subtotal must not overwrite the active state's total.
                if row.is_region_total() && state.is_some() {
                    tracing::debug!(row = r, "region total inside state block ignored");
                    continue;
                }
                let Some(code) = state.or_else(|| row.state_mention()) else {
                    tracing::debug!(row = r, "total row without state context");
                    continue;
                };
                if IMPORT_ONLY_STATES.contains(&code) {
                    continue;
                }
                let value = row
                    .number(Field::MonitoredCapacity)
                    .or_else(|| row.max_number());
                totals.insert(code, value);
            }
            _ => {}
        }
    }

    totals
        .into_iter()
        .map(|(code, value)| RegionUpdate {
            state: code.to_string(),
            date: report_date,
            field: RegionField::MonitoredCapacityMw(value),
        })
        .collect()
}

// =============================================================================
// Detail pass
// =============================================================================

/// Walk plant and unit rows, resolving identities and inferring status.
pub fn detail_pass(
    grid: &ReportGrid,
    header: &HeaderMap,
    registry: &mut PlantRegistry,
    batch: &mut FileBatch,
) {
    let date = batch.report_date;
    let mut ctx = ParseContext::default();

    for r in header.data_start()..grid.height() {
        let Some(row) = RowView::new(grid, header, r) else {
            continue;
        };
        let (rule, kind) = classify_with_rule(&row);
        tracing::trace!(row = r, rule, "classified");
        match kind {
            RowKind::StateHeader { .. }
            | RowKind::SectorHeader { .. }
            | RowKind::TypeHeader { .. } => {
                ctx.enter(&kind);
            }
            // Consumed by the aggregate pass.
            RowKind::AggregateTotal => {}
            RowKind::UnitDetail { unit } => match ctx.plant {
                Some(plant_id) => {
                    let subject = StatusSubject::Unit;
                    if let Some(status) =
                        status_record(grid, header, r, plant_id, &unit, subject, date)
                    {
                        batch.statuses.push(status);
                    }
                }
                None => batch.skipped_rows += 1,
            },
            RowKind::PlantDetail { name, capacity_mw } => {
                let Some(state) = ctx.state.or_else(|| row.state_mention()) else {
                    batch.unresolved.push(Unresolved { row: r, name });
                    batch.skipped_rows += 1;
                    // Units below belong to the unresolved plant.
                    ctx.plant = None;
                    continue;
                };
                let (plant_id, _) = registry.resolve(&name, state);
                ctx.plant = Some(plant_id);

                batch.plants.push(PlantRecord {
                    id: plant_id,
                    name,
                    state: state.to_string(),
                    sector: ctx.sector.map(str::to_string),
                    energy_type: ctx.energy_type.map(str::to_string),
                });
                batch.production.push(ProductionLog {
                    plant_id,
                    date,
                    capacity_mw: Some(capacity_mw),
                    actual_mu: row.number(Field::ActualGeneration),
                    target_mu: row.number(Field::TargetGeneration),
                    coal_stock_days: row.number(Field::CoalStockDays),
                    efficiency_pct: None,
                    scope: MeasurementScope::Daily,
                });
                let subject = StatusSubject::MainPlant;
                if let Some(status) =
                    status_record(grid, header, r, plant_id, MAIN_UNIT, subject, date)
                {
                    batch.statuses.push(status);
                }
            }
            RowKind::Ignorable => batch.skipped_rows += 1,
        }
    }
}

fn status_record(
    grid: &ReportGrid,
    header: &HeaderMap,
    row: usize,
    plant_id: PlantId,
    unit: &str,
    subject: StatusSubject,
    date: NaiveDate,
) -> Option<StatusRecord> {
    let remarks = clean_text(header.cell(grid, row, Field::Remarks));
    let outage_date = parse_date(header.cell(grid, row, Field::OutageDate));
    let decision = infer(subject, &remarks, outage_date);
    if !decision.write {
        return None;
    }
    Some(StatusRecord {
        plant_id,
        unit: unit.to_string(),
        date,
        outage_mw: parse_number(header.cell(grid, row, Field::OutageCapacity)),
        status: decision.status,
        outage_date,
        expected_sync: parse_date(header.cell(grid, row, Field::ExpectedSyncDate)),
        remarks: (!remarks.is_empty()).then_some(remarks),
    })
}
