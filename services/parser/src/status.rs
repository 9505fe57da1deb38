//! Operational-status inference from outage-related cells.

use std::fmt;

use chrono::NaiveDate;

/// Remark text that marks a plant as not yet commissioned. Matched
/// literally; paraphrases fall through to `UnderOutage`.
pub const NOT_COMMISSIONED_MARKER: &str = "NOT YET COMMISSIONED";

/// Unit identifier used for plant-level status rows.
pub const MAIN_UNIT: &str = "Main";

/// Unit identifier used when a unit row carries no number.
pub const UNKNOWN_UNIT: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationalStatus {
    Active,
    UnderOutage,
    NotCommissioned,
}

impl OperationalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationalStatus::Active => "Active",
            OperationalStatus::UnderOutage => "Under Outage",
            OperationalStatus::NotCommissioned => "Not Commissioned",
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of row the outage cells came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSubject {
    MainPlant,
    Unit,
}

/// Outcome of the rule table: the status label and whether a record is
/// written at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDecision {
    pub status: OperationalStatus,
    pub write: bool,
}

/// Apply the rule table over "remarks present" and "outage date present".
///
/// | remarks | outage date | status                         | written |
/// |---------|-------------|--------------------------------|---------|
/// | no      | no          | Active                         | no      |
/// | no      | yes         | Active                         | yes     |
/// | yes     | yes         | UnderOutage                    | yes     |
/// | yes     | no (main)   | NotCommissioned if marker else UnderOutage | yes |
/// | yes     | no (unit)   | NotCommissioned                | yes     |
pub fn infer(
    subject: StatusSubject,
    remarks: &str,
    outage_date: Option<NaiveDate>,
) -> StatusDecision {
    let has_remarks = !remarks.trim().is_empty();
    let status = match (has_remarks, outage_date.is_some(), subject) {
        (false, false, _) => {
            return StatusDecision {
                status: OperationalStatus::Active,
                write: false,
            }
        }
        (false, true, _) => OperationalStatus::Active,
        (true, true, _) => OperationalStatus::UnderOutage,
        (true, false, StatusSubject::Unit) => OperationalStatus::NotCommissioned,
        (true, false, StatusSubject::MainPlant) => {
            if remarks.to_uppercase().contains(NOT_COMMISSIONED_MARKER) {
                OperationalStatus::NotCommissioned
            } else {
                OperationalStatus::UnderOutage
            }
        }
    };
    StatusDecision {
        status,
        write: true,
    }
}
