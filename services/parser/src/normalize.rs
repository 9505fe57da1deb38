//! Value Normalizer - pure conversions from raw cells to typed values.
//!
//! Nothing here fails: an unparseable field becomes `None` and the row
//! carries on with a null in that column.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::grid::{Cell, ReportGrid};

/// Placeholders that mean "no value" in the source reports.
const NULL_MARKERS: &[&str] = &["", "-", "--", "\u{2014}", "NA", "N.A.", "N/A", "NAN", "NONE"];

/// Placeholders that mean an explicit zero.
const ZERO_MARKERS: &[&str] = &["NIL"];

/// Excel's day zero (1900 date system, including the phantom leap day).
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial values outside this window are counts, not dates.
const SERIAL_RANGE: std::ops::Range<f64> = 10_000.0..100_000.0;

static DMY_LOOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})").expect("valid regex"));

static DMY_STRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[/\-](\d{2})[/\-](\d{4})").expect("valid regex"));

static YMD_STRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[/\-](\d{2})[/\-](\d{2})").expect("valid regex"));

/// Cleaned text of a cell; empty for blanks.
pub fn clean_text(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(s) => s.replace(['\r', '\n'], " ").trim().to_string(),
        other => other.to_string(),
    }
}

/// Parse a number, tolerating thousands separators, units and placeholders.
///
/// `"1,234.50"` is `1234.5`, `"-"`, `""` and `"N/A"` are `None`, `"NIL"` is
/// `0.0`.
pub fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Number(_) => None,
        Cell::Text(s) => parse_number_str(s),
    }
}

pub fn parse_number_str(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let upper = s.to_uppercase();
    if NULL_MARKERS.contains(&upper.as_str()) {
        return None;
    }
    if ZERO_MARKERS.contains(&upper.as_str()) {
        return Some(0.0);
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if matches!(cleaned.as_str(), "" | "." | "-" | "-.") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Convert an Excel serial day number to a calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Parse a date cell: serial numbers, common day-first textual forms, and a
/// loose `d/m/y` pattern anywhere in the text. Unparseable input is `None`.
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => serial_to_date(*n),
        Cell::Text(s) => parse_date_str(s),
    }
}

pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let first_token = s.split_whitespace().next().unwrap_or(s);
    // `%Y` also accepts two-digit years; those belong to `%d/%m/%y`.
    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y", "%d-%b-%Y", "%d.%m.%Y"] {
        match NaiveDate::parse_from_str(first_token, fmt) {
            Ok(d) if d.year() >= 1900 => return Some(d),
            _ => {}
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %b %Y") {
        return Some(d);
    }

    let caps = DMY_LOOSE.captures(s)?;
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year_raw = &caps[3];
    let mut year: i32 = year_raw.parse().ok()?;
    if year_raw.len() == 2 {
        year += 2000;
    }
    // Day-first, then month-first for values like 09/25/2025.
    NaiveDate::from_ymd_opt(year, second, first)
        .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
}

/// Find the report date printed in the first rows of a report.
pub fn report_date_from_grid(grid: &ReportGrid) -> Option<NaiveDate> {
    for r in 0..grid.height().min(10) {
        let line = grid
            .row(r)
            .iter()
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if line.is_empty() {
            continue;
        }
        if let Some(c) = DMY_STRICT.captures(&line) {
            let date =
                NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[2].parse().ok()?, c[1].parse().ok()?);
            if date.is_some() {
                return date;
            }
        }
        if let Some(c) = YMD_STRICT.captures(&line) {
            let date =
                NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
            if date.is_some() {
                return date;
            }
        }
    }
    None
}

/// A plausible entity name: at least two characters and one letter.
pub fn is_plausible_name(s: &str) -> bool {
    s.chars().count() >= 2 && s.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::text(s)
    }

    // -------------------------------------------------------------------------
    // NUMBERS
    // -------------------------------------------------------------------------

    #[test]
    fn test_number_with_thousands_separator() {
        assert_eq!(parse_number(&text("1,234.50")), Some(1234.50));
    }

    #[test]
    fn test_number_placeholders_are_null() {
        for raw in ["-", "", "N/A", "NA", "n.a.", "--", "\u{2014}"] {
            assert_eq!(parse_number(&text(raw)), None, "{raw:?}");
        }
        assert_eq!(parse_number(&Cell::Empty), None);
    }

    #[test]
    fn test_number_nil_is_zero() {
        assert_eq!(parse_number(&text("NIL")), Some(0.0));
        assert_eq!(parse_number(&text("nil")), Some(0.0));
    }

    #[test]
    fn test_number_strips_units_and_keeps_sign() {
        assert_eq!(parse_number(&text("210 MW")), Some(210.0));
        assert_eq!(parse_number(&text("-12.5")), Some(-12.5));
    }

    #[test]
    fn test_number_garbage_is_null() {
        assert_eq!(parse_number(&text("ALPHA TPS")), None);
        assert_eq!(parse_number(&text("12-05")), None);
    }

    #[test]
    fn test_number_cell_passthrough() {
        assert_eq!(parse_number(&Cell::Number(500.0)), Some(500.0));
        assert_eq!(parse_number(&Cell::Number(f64::NAN)), None);
    }

    // -------------------------------------------------------------------------
    // DATES
    // -------------------------------------------------------------------------

    #[test]
    fn test_text_and_serial_dates_agree() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();
        let serial = (expected - epoch).num_days() as f64;

        assert_eq!(parse_date(&text("05/09/2025")), Some(expected));
        assert_eq!(parse_date(&Cell::Number(serial)), Some(expected));
    }

    #[test]
    fn test_date_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 8, 14).unwrap();
        assert_eq!(parse_date_str("14-08-2025"), Some(d));
        assert_eq!(parse_date_str("2025-08-14"), Some(d));
        assert_eq!(parse_date_str("14-Aug-2025"), Some(d));
        assert_eq!(parse_date_str("14 Aug 2025"), Some(d));
        assert_eq!(parse_date_str("14/08/25"), Some(d));
        assert_eq!(parse_date_str("14/08/2025 10:30"), Some(d));
    }

    #[test]
    fn test_loose_date_inside_text() {
        let d = NaiveDate::from_ymd_opt(2025, 8, 3).unwrap();
        assert_eq!(parse_date_str("since 3.8.2025 (forced)"), Some(d));
    }

    #[test]
    fn test_month_first_when_day_first_impossible() {
        let d = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        assert_eq!(parse_date_str("on 9/25/2025"), Some(d));
    }

    #[test]
    fn test_unparseable_dates_are_null() {
        assert_eq!(parse_date_str("shortly"), None);
        assert_eq!(parse_date_str("99/99/2025"), None);
        assert_eq!(parse_date(&Cell::Number(12.0)), None);
        assert_eq!(parse_date(&Cell::Empty), None);
    }

    // -------------------------------------------------------------------------
    // TEXT / REPORT DATE
    // -------------------------------------------------------------------------

    #[test]
    fn test_clean_text_flattens_newlines() {
        assert_eq!(clean_text(&text("MONITORED\nCAPACITY")), "MONITORED CAPACITY");
        assert_eq!(clean_text(&Cell::Number(42.0)), "42");
    }

    #[test]
    fn test_report_date_from_title_rows() {
        let grid = ReportGrid::from_strings([
            vec!["CENTRAL ELECTRICITY AUTHORITY"],
            vec!["DAILY GENERATION REPORT FOR 05-09-2025"],
        ]);
        assert_eq!(report_date_from_grid(&grid), NaiveDate::from_ymd_opt(2025, 9, 5));
    }

    #[test]
    fn test_plausible_names() {
        assert!(is_plausible_name("KOTA TPS"));
        assert!(!is_plausible_name("A"));
        assert!(!is_plausible_name("123"));
    }
}
