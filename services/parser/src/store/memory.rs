//! In-memory store for dry runs and tests. Mirrors the upsert semantics of
//! the Postgres store table by table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::ReportStore;
use crate::error::StoreError;
use crate::identity::PlantRegistry;
use crate::model::{
    FileBatch, MeasurementScope, PlantId, PlantRecord, ProductionLog, RegionField, RegionUpdate,
    StatusRecord, WriteStats,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductionRow {
    pub capacity_mw: Option<f64>,
    pub actual_mu: Option<f64>,
    pub target_mu: Option<f64>,
    pub coal_stock_days: Option<f64>,
    pub efficiency_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionRow {
    pub monitored_capacity_mw: Option<f64>,
    pub demand_mu: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub stage: String,
    pub status: String,
    pub detail: serde_json::Value,
}

/// Table contents, keyed like the relational primary keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub dates: BTreeSet<NaiveDate>,
    pub plants: BTreeMap<PlantId, PlantRecord>,
    pub production: BTreeMap<(PlantId, NaiveDate), ProductionRow>,
    pub statuses: BTreeMap<(PlantId, String, NaiveDate), StatusRecord>,
    pub regions: BTreeMap<(String, NaiveDate), RegionRow>,
    pub runs: BTreeMap<Uuid, RunRow>,
}

impl Tables {
    fn upsert_plant(&mut self, plant: &PlantRecord) -> bool {
        match self.plants.get_mut(&plant.id) {
            Some(existing) => {
                existing.name = plant.name.clone();
                existing.state = plant.state.clone();
                if plant.sector.is_some() {
                    existing.sector = plant.sector.clone();
                }
                if plant.energy_type.is_some() {
                    existing.energy_type = plant.energy_type.clone();
                }
                false
            }
            None => {
                self.plants.insert(plant.id, plant.clone());
                true
            }
        }
    }

    fn upsert_production(&mut self, log: &ProductionLog) -> bool {
        let key = (log.plant_id, log.date);
        let inserted = !self.production.contains_key(&key);
        let row = self.production.entry(key).or_default();
        if inserted {
            *row = ProductionRow {
                capacity_mw: log.capacity_mw,
                actual_mu: log.actual_mu,
                target_mu: log.target_mu,
                coal_stock_days: log.coal_stock_days,
                efficiency_pct: log.efficiency_pct,
            };
            return true;
        }
        row.actual_mu = log.actual_mu;
        match log.scope {
            MeasurementScope::Daily => {
                row.capacity_mw = log.capacity_mw;
                row.target_mu = log.target_mu;
                row.coal_stock_days = log.coal_stock_days;
                row.efficiency_pct = log.efficiency_pct;
            }
            MeasurementScope::Station => {
                row.capacity_mw = log.capacity_mw;
                row.target_mu = log.target_mu;
                row.efficiency_pct = log.efficiency_pct;
            }
            MeasurementScope::GenerationOnly => {}
        }
        false
    }

    fn upsert_status(&mut self, status: &StatusRecord) -> bool {
        let key = (status.plant_id, status.unit.clone(), status.date);
        self.statuses.insert(key, status.clone()).is_none()
    }

    fn upsert_region(&mut self, update: &RegionUpdate) -> bool {
        let key = (update.state.clone(), update.date);
        let inserted = !self.regions.contains_key(&key);
        let row = self.regions.entry(key).or_default();
        match update.field {
            RegionField::MonitoredCapacityMw(mw) => row.monitored_capacity_mw = mw,
            RegionField::DemandMu(mu) => row.demand_mu = Some(mu),
        }
        inserted
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current table contents.
    pub fn snapshot(&self) -> Tables {
        self.lock().clone()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn load_registry(&self) -> Result<PlantRegistry, StoreError> {
        let tables = self.lock();
        Ok(PlantRegistry::from_rows(
            tables
                .plants
                .values()
                .map(|p| (p.id.0, p.name.clone(), p.state.clone())),
        ))
    }

    async fn latest_report_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.lock().dates.last().copied())
    }

    async fn report_dates(&self) -> Result<BTreeSet<NaiveDate>, StoreError> {
        Ok(self.lock().dates.clone())
    }

    async fn apply(&self, batch: &FileBatch) -> Result<WriteStats, StoreError> {
        // Staged on a copy so a batch lands whole, like a transaction.
        let mut tables = self.lock();
        let mut staged = tables.clone();
        let mut stats = WriteStats::default();

        staged.dates.insert(batch.report_date);
        for update in &batch.regions {
            stats.record(staged.upsert_region(update));
        }
        for plant in &batch.plants {
            stats.record(staged.upsert_plant(plant));
        }
        for log in &batch.production {
            stats.record(staged.upsert_production(log));
        }
        for status in &batch.statuses {
            stats.record(staged.upsert_status(status));
        }

        *tables = staged;
        Ok(stats)
    }

    async fn apply_regions(&self, updates: &[RegionUpdate]) -> Result<WriteStats, StoreError> {
        let mut tables = self.lock();
        let mut stats = WriteStats::default();
        for update in updates {
            stats.record(tables.upsert_region(update));
        }
        Ok(stats)
    }

    async fn start_run(&self, stage: &str) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        self.lock().runs.insert(
            run_id,
            RunRow {
                stage: stage.to_string(),
                status: "running".to_string(),
                detail: serde_json::json!({}),
            },
        );
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: &str,
        detail: serde_json::Value,
    ) -> Result<(), StoreError> {
        if let Some(run) = self.lock().runs.get_mut(&run_id) {
            run.status = status.to_string();
            run.detail = detail;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::OperationalStatus;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 30).unwrap()
    }

    fn batch() -> FileBatch {
        let mut batch = FileBatch::new(date());
        batch.plants.push(PlantRecord {
            id: PlantId(1),
            name: "ALPHA TPS".to_string(),
            state: "RJ".to_string(),
            sector: Some("ST".to_string()),
            energy_type: Some("TH".to_string()),
        });
        batch.production.push(ProductionLog {
            plant_id: PlantId(1),
            date: date(),
            capacity_mw: Some(500.0),
            actual_mu: Some(420.0),
            target_mu: Some(450.0),
            coal_stock_days: Some(6.0),
            efficiency_pct: None,
            scope: MeasurementScope::Daily,
        });
        batch.statuses.push(StatusRecord {
            plant_id: PlantId(1),
            unit: "Main".to_string(),
            date: date(),
            outage_mw: Some(100.0),
            status: OperationalStatus::UnderOutage,
            outage_date: Some(date()),
            expected_sync: None,
            remarks: Some("Coal shortage".to_string()),
        });
        batch.regions.push(RegionUpdate {
            state: "RJ".to_string(),
            date: date(),
            field: RegionField::MonitoredCapacityMw(Some(500.0)),
        });
        batch
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.apply(&batch()).await.unwrap();
        let after_first = store.snapshot();
        let second = store.apply(&batch()).await.unwrap();

        assert_eq!(first, WriteStats { inserted: 4, updated: 0 });
        assert_eq!(second, WriteStats { inserted: 0, updated: 4 });
        assert_eq!(store.snapshot(), after_first);
    }

    #[tokio::test]
    async fn test_missing_sector_keeps_known_value() {
        let store = MemoryStore::new();
        store.apply(&batch()).await.unwrap();

        let mut again = batch();
        again.plants[0].sector = None;
        store.apply(&again).await.unwrap();
        let tables = store.snapshot();
        assert_eq!(tables.plants[&PlantId(1)].sector.as_deref(), Some("ST"));
    }

    #[tokio::test]
    async fn test_generation_only_touches_actual() {
        let store = MemoryStore::new();
        store.apply(&batch()).await.unwrap();

        let mut summary = FileBatch::new(date());
        summary.production.push(ProductionLog {
            plant_id: PlantId(1),
            date: date(),
            capacity_mw: None,
            actual_mu: Some(9.0),
            target_mu: None,
            coal_stock_days: None,
            efficiency_pct: None,
            scope: MeasurementScope::GenerationOnly,
        });
        store.apply(&summary).await.unwrap();

        let row = &store.snapshot().production[&(PlantId(1), date())];
        assert_eq!(row.actual_mu, Some(9.0));
        assert_eq!(row.capacity_mw, Some(500.0));
        assert_eq!(row.coal_stock_days, Some(6.0));
    }

    #[tokio::test]
    async fn test_region_fields_are_owned_by_their_pass() {
        let store = MemoryStore::new();
        store.apply(&batch()).await.unwrap();
        store
            .apply_regions(&[RegionUpdate {
                state: "RJ".to_string(),
                date: date(),
                field: RegionField::DemandMu(310.0),
            }])
            .await
            .unwrap();
        store.apply(&batch()).await.unwrap();

        let row = &store.snapshot().regions[&("RJ".to_string(), date())];
        assert_eq!(row.monitored_capacity_mw, Some(500.0));
        assert_eq!(row.demand_mu, Some(310.0));
    }

    #[tokio::test]
    async fn test_registry_reflects_persisted_plants() {
        let store = MemoryStore::new();
        store.apply(&batch()).await.unwrap();
        let mut registry = store.load_registry().await.unwrap();
        assert_eq!(registry.resolve("ALPHA TPS", "RJ"), (PlantId(1), false));
        assert_eq!(registry.resolve("BETA TPS", "RJ"), (PlantId(2), true));
        assert_eq!(store.latest_report_date().await.unwrap(), Some(date()));
    }

    #[tokio::test]
    async fn test_run_bookkeeping() {
        let store = MemoryStore::new();
        let id = store.start_run("daily").await.unwrap();
        store
            .finish_run(id, "ok", serde_json::json!({ "processed": 3 }))
            .await
            .unwrap();
        let run = &store.snapshot().runs[&id];
        assert_eq!(run.status, "ok");
        assert_eq!(run.detail["processed"], 3);
    }
}
