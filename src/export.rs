//! CSV artifacts built from a loaded series.

use crate::error::AppError;
use crate::models::CanonicalSeries;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Monthly credit estimate for one service, extrapolated from its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditEstimate {
    pub service: String,
    pub total_credits: f64,
    pub days_of_data: i64,
    pub avg_credits_per_day: f64,
    pub est_credits_per_month: f64,
    pub est_cost_per_month: f64,
}

/// Days of data is the inclusive span between a service's first and last
/// record, so gaps count toward it.
pub fn credit_estimates(series: &CanonicalSeries, credit_cost: f64) -> Vec<CreditEstimate> {
    let mut acc: BTreeMap<&str, (f64, NaiveDate, NaiveDate)> = BTreeMap::new();
    for r in series.records() {
        acc.entry(r.service_type.as_str())
            .and_modify(|(credits, first, last)| {
                *credits += r.total_credits;
                *first = (*first).min(r.date);
                *last = (*last).max(r.date);
            })
            .or_insert((r.total_credits, r.date, r.date));
    }

    acc.into_iter()
        .map(|(service, (total_credits, first, last))| {
            let days_of_data = (last - first).num_days() + 1;
            let avg_credits_per_day = total_credits / days_of_data as f64;
            let est_credits_per_month = avg_credits_per_day * 30.0;
            CreditEstimate {
                service: service.to_string(),
                total_credits,
                days_of_data,
                avg_credits_per_day,
                est_credits_per_month,
                est_cost_per_month: est_credits_per_month * credit_cost,
            }
        })
        .collect()
}

pub fn history_csv(series: &CanonicalSeries) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "DATE",
        "SERVICE_TYPE",
        "DAILY_UNIQUE_USERS",
        "TOTAL_OPERATIONS",
        "TOTAL_CREDITS",
    ])?;
    for r in series.records() {
        writer.write_record([
            r.date.to_string(),
            r.service_type.clone(),
            r.daily_unique_users.to_string(),
            r.total_operations.to_string(),
            r.total_credits.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn credit_estimate_csv(rows: &[CreditEstimate]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Service",
        "Total Credits",
        "Avg Credits/Day",
        "Est. Credits/Month",
        "Est. Cost/Month",
    ])?;
    for r in rows {
        writer.write_record([
            r.service.clone(),
            format!("{:.4}", r.total_credits),
            format!("{:.4}", r.avg_credits_per_day),
            format!("{:.4}", r.est_credits_per_month),
            format!("{:.2}", r.est_cost_per_month),
        ])?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AppError> {
    let data = writer
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))?;
    String::from_utf8(data).map_err(|e| AppError::Format(format!("invalid UTF-8 in CSV: {e}")))
}
