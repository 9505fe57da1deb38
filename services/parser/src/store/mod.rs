//! Upsert Writer - the persistence seam.
//!
//! Every write is an insert-or-update keyed by the natural or composite
//! key, so applying the same batch twice changes nothing beyond the
//! overwritten values.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::PlantRegistry;
use crate::model::{FileBatch, RegionUpdate, WriteStats};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Snapshot of every persisted plant identity.
    async fn load_registry(&self) -> Result<PlantRegistry, StoreError>;

    /// Latest date in the date dimension.
    async fn latest_report_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Every date in the date dimension.
    async fn report_dates(&self) -> Result<BTreeSet<NaiveDate>, StoreError>;

    /// Write one file's records in a single transaction. Either everything
    /// is committed or nothing is.
    async fn apply(&self, batch: &FileBatch) -> Result<WriteStats, StoreError>;

    /// Write region fields outside a file batch (demand backfill), in a
    /// single transaction.
    async fn apply_regions(&self, updates: &[RegionUpdate]) -> Result<WriteStats, StoreError>;

    /// Record the start of an ingestion run.
    async fn start_run(&self, stage: &str) -> Result<Uuid, StoreError>;

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: &str,
        detail: serde_json::Value,
    ) -> Result<(), StoreError>;
}
