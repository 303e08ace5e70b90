use crate::error::AppError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One day of usage for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date: NaiveDate,
    pub service_type: String,
    pub daily_unique_users: f64,
    pub total_operations: u64,
    pub total_credits: f64,
}

/// Usage records sorted ascending by date, unique per (date, service).
///
/// Records sharing a date are ordered by service type so that every
/// consumer sees the same sequence. Each service's operation total fits in a
/// `u64`, so any sum over a subset of one service's records does too.
#[derive(Debug, Clone)]
pub struct CanonicalSeries {
    records: Vec<UsageRecord>,
}

impl CanonicalSeries {
    pub fn new(mut records: Vec<UsageRecord>) -> Result<Self, AppError> {
        if records.is_empty() {
            return Err(AppError::EmptyInput("no usage rows to analyze".into()));
        }

        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.service_type.cmp(&b.service_type))
        });

        let mut seen = HashSet::with_capacity(records.len());
        let mut operations: HashMap<&str, u64> = HashMap::new();
        for r in &records {
            if !seen.insert((r.date, r.service_type.as_str())) {
                return Err(AppError::Format(format!(
                    "duplicate usage row for {} / {}",
                    r.date, r.service_type
                )));
            }
            let total = operations.entry(r.service_type.as_str()).or_insert(0);
            *total = total.checked_add(r.total_operations).ok_or_else(|| {
                AppError::Format(format!(
                    "total operations for {} exceed {}",
                    r.service_type,
                    u64::MAX
                ))
            })?;
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    /// Distinct service types in lexical order.
    pub fn service_types(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.service_type.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn distinct_days(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingAggregate {
    pub date: NaiveDate,
    pub service_type: String,
    pub credits_30d_total: f64,
    pub operations_30d_total: u64,
    pub users_30d_avg: f64,
    pub cost_per_user_30d: f64,
    pub window_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub month: u32,
    pub service_type: String,
    pub projected_credits: f64,
    pub projected_users: f64,
    pub projected_cost_usd: f64,
    pub cost_per_user_usd: f64,
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub user_count: u32,
    pub requests_per_day: u32,
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid base date")
            + chrono::Duration::days(offset)
    }

    pub fn record(
        offset: i64,
        service: &str,
        users: f64,
        ops: u64,
        credits: f64,
    ) -> UsageRecord {
        UsageRecord {
            date: day(offset),
            service_type: service.to_string(),
            daily_unique_users: users,
            total_operations: ops,
            total_credits: credits,
        }
    }

    pub fn series(records: Vec<UsageRecord>) -> CanonicalSeries {
        CanonicalSeries::new(records).expect("valid series")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn new_sorts_by_date_then_service() {
        let s = series(vec![
            record(2, "search", 1.0, 1, 1.0),
            record(0, "llm", 1.0, 1, 1.0),
            record(0, "analyst", 1.0, 1, 1.0),
        ]);
        let keys: Vec<_> = s
            .records()
            .iter()
            .map(|r| (r.date, r.service_type.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![(day(0), "analyst"), (day(0), "llm"), (day(2), "search")]
        );
        assert_eq!(s.first_date(), Some(day(0)));
        assert_eq!(s.last_date(), Some(day(2)));
    }

    #[test]
    fn new_rejects_empty_and_duplicates() {
        assert!(matches!(
            CanonicalSeries::new(vec![]),
            Err(AppError::EmptyInput(_))
        ));
        let err = CanonicalSeries::new(vec![
            record(0, "llm", 1.0, 1, 1.0),
            record(0, "llm", 2.0, 2, 2.0),
        ])
        .expect_err("duplicate rows");
        assert!(err.to_string().contains("duplicate usage row"));
    }

    #[test]
    fn new_rejects_operation_totals_past_u64() {
        let err = CanonicalSeries::new(vec![
            record(0, "llm", 1.0, 10_000_000_000_000_000_000, 1.0),
            record(1, "llm", 1.0, 10_000_000_000_000_000_000, 1.0),
        ])
        .expect_err("overflowing operations");
        assert!(matches!(err, AppError::Format(_)));
        assert!(err.to_string().contains("total operations for llm"));

        let split = series(vec![
            record(0, "llm", 1.0, 10_000_000_000_000_000_000, 1.0),
            record(0, "search", 1.0, 10_000_000_000_000_000_000, 1.0),
        ]);
        assert_eq!(split.records().len(), 2);
    }

    #[test]
    fn distinct_days_counts_dates_not_rows() {
        let s = series(vec![
            record(0, "llm", 1.0, 1, 1.0),
            record(0, "search", 1.0, 1, 1.0),
            record(5, "llm", 1.0, 1, 1.0),
        ]);
        assert_eq!(s.distinct_days(), 2);
        assert_eq!(s.service_types(), vec!["llm", "search"]);
    }

    #[test]
    fn ratio_or_zero_guards_zero_denominator() {
        assert_eq!(ratio_or_zero(10.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(10.0, 4.0), 2.5);
    }
}
