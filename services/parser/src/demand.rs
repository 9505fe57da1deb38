//! Demand backfill from the precomputed per-state daily average CSV.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::DemandError;
use crate::model::{RegionField, RegionUpdate};
use crate::normalize::{parse_date_str, parse_number_str};
use crate::refdata::STATES;

const REQUIRED_COLUMNS: [&str; 3] = ["StateCode", "Date", "Avg_Demand"];

#[derive(Debug, Deserialize)]
struct DemandRow {
    #[serde(rename = "StateCode")]
    state_code: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Avg_Demand")]
    avg_demand: String,
}

/// Demand figures ready to write, plus how many CSV rows were left out.
#[derive(Debug, Default, PartialEq)]
pub struct DemandPlan {
    pub updates: Vec<RegionUpdate>,
    pub skipped: usize,
}

pub fn read_demand(
    path: &Path,
    known_dates: &BTreeSet<NaiveDate>,
) -> Result<DemandPlan, DemandError> {
    parse_demand(File::open(path)?, known_dates)
}

/// Keep rows whose date is already in the date dimension, whose state is
/// known and whose demand is numeric.
pub fn parse_demand<R: Read>(
    reader: R,
    known_dates: &BTreeSet<NaiveDate>,
) -> Result<DemandPlan, DemandError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<&'static str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(DemandError::MissingColumns(missing));
    }

    let mut plan = DemandPlan::default();
    for (line, result) in rdr.deserialize::<DemandRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!(line = line + 2, error = %e, "unreadable demand row");
                plan.skipped += 1;
                continue;
            }
        };
        let code = row.state_code.to_uppercase();
        let known_state = STATES.iter().any(|(_, c)| *c == code);
        let date = parse_date_str(&row.date).filter(|d| known_dates.contains(d));
        match (known_state, date, parse_number_str(&row.avg_demand)) {
            (true, Some(date), Some(demand)) => plan.updates.push(RegionUpdate {
                state: code,
                date,
                field: RegionField::DemandMu(demand),
            }),
            _ => plan.skipped += 1,
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dates() -> BTreeSet<NaiveDate> {
        [NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()].into_iter().collect()
    }

    #[test]
    fn test_rows_outside_date_dimension_are_skipped() {
        let csv = "StateCode,Date,Avg_Demand\nRJ,2025-08-01,312.5\nRJ,2025-08-02,300\nGJT,2025-08-01,n/a\nXX,2025-08-01,10\n";
        let plan = parse_demand(csv.as_bytes(), &dates()).unwrap();
        assert_eq!(
            plan.updates,
            vec![RegionUpdate {
                state: "RJ".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                field: RegionField::DemandMu(312.5),
            }]
        );
        assert_eq!(plan.skipped, 3);
    }

    #[test]
    fn test_missing_columns() {
        let csv = "State,Date,Demand\nRJ,2025-08-01,1\n";
        match parse_demand(csv.as_bytes(), &dates()) {
            Err(DemandError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["StateCode", "Avg_Demand"])
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "StateCode,Date,Avg_Demand\nPNB,01/08/2025,150\n").unwrap();
        let plan = read_demand(file.path(), &dates()).unwrap();
        assert_eq!(plan.updates.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_demand(Path::new("/nonexistent/demand.csv"), &dates()).unwrap_err();
        assert!(matches!(err, DemandError::Io(_)));
    }
}
