//! Error types for the ingestion pipeline.
//!
//! Only file-level structural problems are errors. Row and field problems
//! degrade locally (null field, skipped row, default status) and never
//! surface here.

use std::path::PathBuf;

use thiserror::Error;

/// A source document could not be decoded by any strategy.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("no decoding strategy could read {path}: {}", format_attempts(.attempts))]
    Exhausted {
        path: PathBuf,
        attempts: Vec<(&'static str, String)>,
    },

    #[error("{path} contains no sheets")]
    NoSheets { path: PathBuf },

    #[error("{path} contains no table data")]
    NoTables { path: PathBuf },
}

fn format_attempts(attempts: &[(&'static str, String)]) -> String {
    attempts
        .iter()
        .map(|(strategy, err)| format!("{strategy} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Essential columns stayed unmapped after the numeric-density fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("essential column(s) not found: {}", .missing.join(", "))]
pub struct HeaderNotFoundError {
    pub missing: Vec<&'static str>,
}

/// Failures talking to the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("plant identity lookup failed: {0}")]
    IdentityLookup(#[source] sqlx::Error),

    #[error("write failed ({statement}): {source}")]
    Write {
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl StoreError {
    pub(crate) fn write(statement: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |source| StoreError::Write { statement, source }
    }
}

/// The demand backfill CSV could not be used.
#[derive(Error, Debug)]
pub enum DemandError {
    #[error("demand csv is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("demand csv could not be read: {0}")]
    Csv(#[from] csv::Error),

    #[error("demand csv could not be opened: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that aborts the processing of one file.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    HeaderNotFound(#[from] HeaderNotFoundError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Demand(#[from] DemandError),

    #[error("no report date in file name or top rows of {0}")]
    MissingReportDate(PathBuf),
}

impl IngestError {
    /// Unreadable files are skipped; every other failure counts as failed.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, IngestError::Read(_))
    }
}
