//! Postgres store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::ReportStore;
use crate::error::StoreError;
use crate::identity::PlantRegistry;
use crate::model::{
    FileBatch, MeasurementScope, PlantRecord, ProductionLog, RegionField, RegionUpdate,
    StatusRecord, WriteStats,
};

const UPSERT_DATE: &str = r#"
    INSERT INTO date_dim (report_date, day, month, year)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (report_date) DO NOTHING
"#;

const UPSERT_PLANT: &str = r#"
    INSERT INTO power_plants (plant_id, plant_name, state_code, sector_id, type_id)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (plant_id) DO UPDATE SET
        plant_name = EXCLUDED.plant_name,
        state_code = EXCLUDED.state_code,
        sector_id = COALESCE(EXCLUDED.sector_id, power_plants.sector_id),
        type_id = COALESCE(EXCLUDED.type_id, power_plants.type_id)
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_PRODUCTION_DAILY: &str = r#"
    INSERT INTO production_log
        (plant_id, log_date, operational_capacity_mw, actual_mu, target_mu, coal_stock_days, efficiency_pct)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (plant_id, log_date) DO UPDATE SET
        operational_capacity_mw = EXCLUDED.operational_capacity_mw,
        actual_mu = EXCLUDED.actual_mu,
        target_mu = EXCLUDED.target_mu,
        coal_stock_days = EXCLUDED.coal_stock_days,
        efficiency_pct = EXCLUDED.efficiency_pct
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_PRODUCTION_STATION: &str = r#"
    INSERT INTO production_log
        (plant_id, log_date, operational_capacity_mw, actual_mu, target_mu, coal_stock_days, efficiency_pct)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (plant_id, log_date) DO UPDATE SET
        operational_capacity_mw = EXCLUDED.operational_capacity_mw,
        actual_mu = EXCLUDED.actual_mu,
        target_mu = EXCLUDED.target_mu,
        efficiency_pct = EXCLUDED.efficiency_pct
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_PRODUCTION_GENERATION: &str = r#"
    INSERT INTO production_log
        (plant_id, log_date, operational_capacity_mw, actual_mu, target_mu, coal_stock_days, efficiency_pct)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (plant_id, log_date) DO UPDATE SET
        actual_mu = EXCLUDED.actual_mu
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_STATUS: &str = r#"
    INSERT INTO operational_status
        (plant_id, unit_number, status_date, cap_under_outage_mw, status, outage_date, expected_sync_date, remarks)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (plant_id, unit_number, status_date) DO UPDATE SET
        cap_under_outage_mw = EXCLUDED.cap_under_outage_mw,
        status = EXCLUDED.status,
        outage_date = EXCLUDED.outage_date,
        expected_sync_date = EXCLUDED.expected_sync_date,
        remarks = EXCLUDED.remarks
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_MONITORED: &str = r#"
    INSERT INTO region_details (state_code, report_date, monitored_capacity_mw)
    VALUES ($1, $2, $3)
    ON CONFLICT (state_code, report_date) DO UPDATE SET
        monitored_capacity_mw = EXCLUDED.monitored_capacity_mw
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_DEMAND: &str = r#"
    INSERT INTO region_details (state_code, report_date, demand_mu)
    VALUES ($1, $2, $3)
    ON CONFLICT (state_code, report_date) DO UPDATE SET
        demand_mu = EXCLUDED.demand_mu
    RETURNING (xmax = 0) AS inserted
"#;

type Tx = Transaction<'static, Postgres>;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn begin(&self) -> Result<Tx, StoreError> {
        self.pool.begin().await.map_err(StoreError::Transaction)
    }

    async fn upsert_date(tx: &mut Tx, date: NaiveDate) -> Result<(), StoreError> {
        sqlx::query(UPSERT_DATE)
            .bind(date)
            .bind(date.day() as i32)
            .bind(date.month() as i32)
            .bind(date.year())
            .execute(&mut **tx)
            .await
            .map_err(StoreError::write("date_dim"))?;
        Ok(())
    }

    async fn upsert_plant(tx: &mut Tx, plant: &PlantRecord) -> Result<bool, StoreError> {
        sqlx::query_scalar(UPSERT_PLANT)
            .bind(plant.id.0)
            .bind(&plant.name)
            .bind(&plant.state)
            .bind(&plant.sector)
            .bind(&plant.energy_type)
            .fetch_one(&mut **tx)
            .await
            .map_err(StoreError::write("power_plants"))
    }

    async fn upsert_production(tx: &mut Tx, log: &ProductionLog) -> Result<bool, StoreError> {
        let sql = match log.scope {
            MeasurementScope::Daily => UPSERT_PRODUCTION_DAILY,
            MeasurementScope::Station => UPSERT_PRODUCTION_STATION,
            MeasurementScope::GenerationOnly => UPSERT_PRODUCTION_GENERATION,
        };
        sqlx::query_scalar(sql)
            .bind(log.plant_id.0)
            .bind(log.date)
            .bind(log.capacity_mw)
            .bind(log.actual_mu)
            .bind(log.target_mu)
            .bind(log.coal_stock_days)
            .bind(log.efficiency_pct)
            .fetch_one(&mut **tx)
            .await
            .map_err(StoreError::write("production_log"))
    }

    async fn upsert_status(tx: &mut Tx, status: &StatusRecord) -> Result<bool, StoreError> {
        sqlx::query_scalar(UPSERT_STATUS)
            .bind(status.plant_id.0)
            .bind(&status.unit)
            .bind(status.date)
            .bind(status.outage_mw)
            .bind(status.status.as_str())
            .bind(status.outage_date)
            .bind(status.expected_sync)
            .bind(&status.remarks)
            .fetch_one(&mut **tx)
            .await
            .map_err(StoreError::write("operational_status"))
    }

    async fn upsert_region(tx: &mut Tx, update: &RegionUpdate) -> Result<bool, StoreError> {
        let query = match update.field {
            RegionField::MonitoredCapacityMw(mw) => {
                sqlx::query_scalar::<Postgres, bool>(UPSERT_MONITORED)
                    .bind(&update.state)
                    .bind(update.date)
                    .bind(mw)
            }
            RegionField::DemandMu(mu) => sqlx::query_scalar::<Postgres, bool>(UPSERT_DEMAND)
                .bind(&update.state)
                .bind(update.date)
                .bind(Some(mu)),
        };
        query
            .fetch_one(&mut **tx)
            .await
            .map_err(StoreError::write("region_details"))
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn load_registry(&self) -> Result<PlantRegistry, StoreError> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT plant_id, plant_name, state_code FROM power_plants")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::IdentityLookup)?;
        Ok(PlantRegistry::from_rows(rows))
    }

    async fn latest_report_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        sqlx::query_scalar("SELECT MAX(report_date) FROM date_dim")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Query)
    }

    async fn report_dates(&self) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar("SELECT report_date FROM date_dim")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(dates.into_iter().collect())
    }

    async fn apply(&self, batch: &FileBatch) -> Result<WriteStats, StoreError> {
        let mut tx = self.begin().await?;
        let mut stats = WriteStats::default();

        Self::upsert_date(&mut tx, batch.report_date).await?;
        for update in &batch.regions {
            stats.record(Self::upsert_region(&mut tx, update).await?);
        }
        for plant in &batch.plants {
            stats.record(Self::upsert_plant(&mut tx, plant).await?);
        }
        for log in &batch.production {
            stats.record(Self::upsert_production(&mut tx, log).await?);
        }
        for status in &batch.statuses {
            stats.record(Self::upsert_status(&mut tx, status).await?);
        }

        tx.commit().await.map_err(StoreError::Transaction)?;
        Ok(stats)
    }

    async fn apply_regions(&self, updates: &[RegionUpdate]) -> Result<WriteStats, StoreError> {
        let mut tx = self.begin().await?;
        let mut stats = WriteStats::default();
        for update in updates {
            stats.record(Self::upsert_region(&mut tx, update).await?);
        }
        tx.commit().await.map_err(StoreError::Transaction)?;
        Ok(stats)
    }

    async fn start_run(&self, stage: &str) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO ingest_runs (run_id, component, stage, status, detail)
            VALUES ($1, 'parser', $2, 'running', '{}'::jsonb)
            "#,
        )
        .bind(run_id)
        .bind(stage)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write("ingest_runs"))?;
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: &str,
        detail: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE ingest_runs
            SET finished_at = now(), status = $2, detail = detail || $3
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write("ingest_runs"))?;
        Ok(())
    }
}
