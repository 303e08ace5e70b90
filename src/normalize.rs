use crate::error::AppError;
use crate::models::{CanonicalSeries, UsageRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE: &str = "DATE";
const USAGE_DATE: &str = "USAGE_DATE";
const SERVICE_TYPE: &str = "SERVICE_TYPE";
const TOTAL_CREDITS: &str = "TOTAL_CREDITS";
const DAILY_UNIQUE_USERS: &str = "DAILY_UNIQUE_USERS";
const TOTAL_OPERATIONS: &str = "TOTAL_OPERATIONS";

/// Columnar view of raw rows: each entry is a header and its cells.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    columns: Vec<(String, Vec<String>)>,
}

impl RawTable {
    pub fn from_columns(columns: Vec<(String, Vec<String>)>) -> Self {
        Self { columns }
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut columns: Vec<(String, Vec<String>)> = headers
            .into_iter()
            .map(|h| (h, Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            for (idx, (_, cells)) in columns.iter_mut().enumerate() {
                cells.push(row.get(idx).cloned().unwrap_or_default());
            }
        }
        Self { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |(_, cells)| cells.len())
    }

    fn column(&self, canonical: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|(name, _)| canonical_column_name(name) == canonical)
            .map(|(_, cells)| cells.as_slice())
    }
}

pub fn canonical_column_name(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

/// Validates a raw table and builds the canonical series from it.
pub fn normalize(table: &RawTable) -> Result<CanonicalSeries, AppError> {
    let rows = table.row_count();
    if let Some((name, cells)) = table.columns.iter().find(|(_, c)| c.len() != rows) {
        return Err(AppError::Schema(format!(
            "column '{name}' has {} values, expected {rows}",
            cells.len()
        )));
    }

    let dates = table
        .column(DATE)
        .or_else(|| table.column(USAGE_DATE))
        .ok_or_else(|| missing_column(DATE))?;
    let services = table
        .column(SERVICE_TYPE)
        .ok_or_else(|| missing_column(SERVICE_TYPE))?;
    let credits = table
        .column(TOTAL_CREDITS)
        .ok_or_else(|| missing_column(TOTAL_CREDITS))?;
    let users = table.column(DAILY_UNIQUE_USERS);
    let operations = table.column(TOTAL_OPERATIONS);

    let mut records = Vec::with_capacity(rows);
    for i in 0..rows {
        let line = i + 1;
        let service_type = services[i].trim();
        if service_type.is_empty() {
            return Err(AppError::Format(format!(
                "row {line}: {SERVICE_TYPE} is blank"
            )));
        }

        records.push(UsageRecord {
            date: parse_date(&dates[i]).ok_or_else(|| {
                AppError::Format(format!("row {line}: unparsable date '{}'", dates[i]))
            })?,
            service_type: service_type.to_string(),
            daily_unique_users: match users {
                Some(cells) => parse_amount(&cells[i], DAILY_UNIQUE_USERS, line)?,
                None => 0.0,
            },
            total_operations: match operations {
                Some(cells) => parse_count(&cells[i], TOTAL_OPERATIONS, line)?,
                None => 0,
            },
            total_credits: parse_amount(&credits[i], TOTAL_CREDITS, line)?,
        });
    }

    CanonicalSeries::new(records)
}

fn missing_column(name: &str) -> AppError {
    AppError::Schema(format!("missing required column {name}"))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

fn parse_amount(raw: &str, column: &str, line: usize) -> Result<f64, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(AppError::Format(format!(
            "row {line}: {column} must be a non-negative number, got '{raw}'"
        ))),
    }
}

/// 2^53: from here on an `f64` may already have rounded the written value.
const MAX_EXACT_FLOAT_COUNT: f64 = 9_007_199_254_740_992.0;

/// Plain digits parse straight to `u64`. Float spellings such as `20.0` are
/// accepted only while they are whole and exactly representable.
fn parse_count(raw: &str, column: &str, line: usize) -> Result<u64, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse::<u64>().map_err(|_| {
            AppError::Format(format!(
                "row {line}: {column} exceeds {}, got '{raw}'",
                u64::MAX
            ))
        });
    }

    let value = parse_amount(raw, column, line)?;
    if value.fract() != 0.0 {
        return Err(AppError::Format(format!(
            "row {line}: {column} must be a whole number, got '{raw}'"
        )));
    }
    if value >= MAX_EXACT_FLOAT_COUNT {
        return Err(AppError::Format(format!(
            "row {line}: {column} is too large to read exactly, got '{raw}'"
        )));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<(&str, Vec<&str>)>) -> RawTable {
        RawTable::from_columns(
            columns
                .into_iter()
                .map(|(name, cells)| {
                    (
                        name.to_string(),
                        cells.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn normalize_matches_columns_case_insensitively() {
        let t = table(vec![
            ("date", vec!["2024-03-02", "2024-03-01"]),
            ("Service_Type", vec!["llm", "llm"]),
            ("total_credits", vec!["2.5", "1.5"]),
            ("DAILY_unique_users", vec!["4", "2"]),
            ("total_operations", vec!["40", "20"]),
        ]);
        let series = normalize(&t).expect("normalize");
        let records = series.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date.to_string(), "2024-03-01");
        assert_eq!(records[0].total_operations, 20);
        assert_eq!(records[1].total_credits, 2.5);
        assert_eq!(records[1].daily_unique_users, 4.0);
    }

    #[test]
    fn normalize_reports_missing_required_column() {
        let t = table(vec![("DATE", vec!["2024-03-01"]), ("SERVICE_TYPE", vec!["llm"])]);
        let err = normalize(&t).expect_err("missing credits");
        assert!(matches!(err, AppError::Schema(_)));
        assert!(err.to_string().contains("TOTAL_CREDITS"));
    }

    #[test]
    fn normalize_defaults_optional_columns_to_zero() {
        let t = table(vec![
            ("DATE", vec!["2024-03-01"]),
            ("SERVICE_TYPE", vec!["llm"]),
            ("TOTAL_CREDITS", vec!["7"]),
        ]);
        let series = normalize(&t).expect("normalize");
        assert_eq!(series.records()[0].daily_unique_users, 0.0);
        assert_eq!(series.records()[0].total_operations, 0);
    }

    #[test]
    fn normalize_accepts_usage_date_alias() {
        let t = table(vec![
            ("usage_date", vec!["2024-03-01 00:00:00.000"]),
            ("SERVICE_TYPE", vec!["llm"]),
            ("TOTAL_CREDITS", vec!["7"]),
        ]);
        let series = normalize(&t).expect("normalize");
        assert_eq!(series.first_date().map(|d| d.to_string()), Some("2024-03-01".into()));
    }

    #[test]
    fn normalize_rejects_bad_values() {
        let bad_date = table(vec![
            ("DATE", vec!["yesterday"]),
            ("SERVICE_TYPE", vec!["llm"]),
            ("TOTAL_CREDITS", vec!["1"]),
        ]);
        assert!(matches!(normalize(&bad_date), Err(AppError::Format(_))));

        let bad_credits = table(vec![
            ("DATE", vec!["2024-03-01"]),
            ("SERVICE_TYPE", vec!["llm"]),
            ("TOTAL_CREDITS", vec!["-1"]),
        ]);
        assert!(matches!(normalize(&bad_credits), Err(AppError::Format(_))));

        let fractional_ops = table(vec![
            ("DATE", vec!["2024-03-01"]),
            ("SERVICE_TYPE", vec!["llm"]),
            ("TOTAL_CREDITS", vec!["1"]),
            ("TOTAL_OPERATIONS", vec!["2.5"]),
        ]);
        assert!(matches!(normalize(&fractional_ops), Err(AppError::Format(_))));

        for huge in ["1e30", "18446744073709551616", "9007199254740993.0"] {
            let t = table(vec![
                ("DATE", vec!["2024-03-01"]),
                ("SERVICE_TYPE", vec!["llm"]),
                ("TOTAL_CREDITS", vec!["1"]),
                ("TOTAL_OPERATIONS", vec![huge]),
            ]);
            assert!(
                matches!(normalize(&t), Err(AppError::Format(_))),
                "accepted {huge}"
            );
        }
    }

    #[test]
    fn operation_counts_keep_every_digit() {
        let t = table(vec![
            ("DATE", vec!["2024-03-01", "2024-03-02", "2024-03-03"]),
            ("SERVICE_TYPE", vec!["llm", "llm", "llm"]),
            ("TOTAL_CREDITS", vec!["1", "1", "1"]),
            ("TOTAL_OPERATIONS", vec!["9007199254740993", "20.0", " 7 "]),
        ]);
        let series = normalize(&t).expect("normalize");
        let ops: Vec<u64> = series.records().iter().map(|r| r.total_operations).collect();
        assert_eq!(ops, vec![9_007_199_254_740_993, 20, 7]);
    }

    #[test]
    fn operation_totals_past_u64_are_rejected() {
        let t = table(vec![
            ("DATE", vec!["2024-03-01", "2024-03-02"]),
            ("SERVICE_TYPE", vec!["llm", "llm"]),
            ("TOTAL_CREDITS", vec!["1", "1"]),
            (
                "TOTAL_OPERATIONS",
                vec!["10000000000000000000", "10000000000000000000"],
            ),
        ]);
        assert!(matches!(normalize(&t), Err(AppError::Format(_))));
    }

    #[test]
    fn normalize_with_no_rows_is_empty_input() {
        let t = table(vec![("DATE", vec![]), ("SERVICE_TYPE", vec![]), ("TOTAL_CREDITS", vec![])]);
        assert!(matches!(normalize(&t), Err(AppError::EmptyInput(_))));
    }

    #[test]
    fn parse_date_supports_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("2024-03-01T10:00:00Z"), expected);
        assert_eq!(parse_date("2024-03-01 10:00:00"), expected);
        assert_eq!(parse_date("03/01/2024"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn from_rows_pads_short_rows() {
        let t = RawTable::from_rows(
            vec!["DATE".into(), "SERVICE_TYPE".into(), "TOTAL_CREDITS".into()],
            vec![vec!["2024-03-01".into(), "llm".into()]],
        );
        assert_eq!(t.row_count(), 1);
        let series = normalize(&t).expect("blank credits count as zero");
        assert_eq!(series.records()[0].total_credits, 0.0);
    }
}
