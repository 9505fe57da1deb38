//! Normalized records produced from one source file.

use chrono::NaiveDate;

use crate::header::Confidence;
use crate::status::OperationalStatus;

/// Stable sequential plant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlantId(pub i64);

/// Insert-or-update of one plant. Sector and type of `None` keep whatever
/// the store already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantRecord {
    pub id: PlantId,
    pub name: String,
    pub state: String,
    pub sector: Option<String>,
    pub energy_type: Option<String>,
}

/// Which measurement columns a production write owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementScope {
    /// Daily report plant row: capacity, actual, target, coal stock and
    /// efficiency.
    Daily,
    /// Renewable station row: capacity, actual, target and efficiency.
    Station,
    /// Renewable state summary: actual generation only.
    GenerationOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionLog {
    pub plant_id: PlantId,
    pub date: NaiveDate,
    pub capacity_mw: Option<f64>,
    pub actual_mu: Option<f64>,
    pub target_mu: Option<f64>,
    pub coal_stock_days: Option<f64>,
    pub efficiency_pct: Option<f64>,
    pub scope: MeasurementScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub plant_id: PlantId,
    /// Unit number, `Main` for the plant row itself.
    pub unit: String,
    pub date: NaiveDate,
    pub outage_mw: Option<f64>,
    pub status: OperationalStatus,
    pub outage_date: Option<NaiveDate>,
    pub expected_sync: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// The single `region_details` column a pass owns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionField {
    MonitoredCapacityMw(Option<f64>),
    DemandMu(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionUpdate {
    pub state: String,
    pub date: NaiveDate,
    pub field: RegionField,
}

/// A reference that could not be resolved; the row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unresolved {
    pub row: usize,
    pub name: String,
}

/// Everything one file contributes, written in a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBatch {
    pub report_date: NaiveDate,
    pub plants: Vec<PlantRecord>,
    pub production: Vec<ProductionLog>,
    pub statuses: Vec<StatusRecord>,
    pub regions: Vec<RegionUpdate>,
    pub unresolved: Vec<Unresolved>,
    /// Rows that matched no record-producing classification.
    pub skipped_rows: usize,
    pub confidence: Confidence,
}

impl FileBatch {
    pub fn new(report_date: NaiveDate) -> Self {
        Self {
            report_date,
            plants: Vec::new(),
            production: Vec::new(),
            statuses: Vec::new(),
            regions: Vec::new(),
            unresolved: Vec::new(),
            skipped_rows: 0,
            confidence: Confidence::Headers,
        }
    }

    pub fn record_count(&self) -> usize {
        self.plants.len() + self.production.len() + self.statuses.len() + self.regions.len()
    }
}

/// Row counts reported by the store for one applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub inserted: usize,
    pub updated: usize,
}

impl WriteStats {
    pub fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }
}
