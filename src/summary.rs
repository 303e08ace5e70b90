use crate::error::AppError;
use crate::models::{ratio_or_zero, CanonicalSeries};
use crate::projection::{summarize_projection, validate_variance, GrowthParams, VarianceBand};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const REPORT_GROWTH_RATE: f64 = 0.25;
pub const REPORT_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceBreakdown {
    pub service_type: String,
    pub total_credits: f64,
    pub avg_daily_users: f64,
    pub total_operations: u64,
    pub total_cost_usd: f64,
    pub pct_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualProjection {
    pub growth_rate: f64,
    pub months: u32,
    pub total_cost: f64,
    pub avg_monthly_cost: f64,
    pub band: VarianceBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub total_credits: f64,
    pub total_cost: f64,
    pub days_of_data: usize,
    pub avg_daily_cost: f64,
    pub active_services: usize,
    pub avg_daily_users: f64,
    pub projection: AnnualProjection,
    pub services: Vec<ServiceBreakdown>,
}

/// Historical run-rate figures plus a fixed 12-month, 25% growth outlook.
pub fn summarize(
    series: &CanonicalSeries,
    credit_cost: f64,
    variance: f64,
) -> Result<SummaryReport, AppError> {
    validate_variance(variance)?;
    let projection = summarize_projection(
        series,
        GrowthParams {
            rate: REPORT_GROWTH_RATE,
            months: REPORT_MONTHS,
            credit_cost,
        },
        variance,
    )?;

    let records = series.records();
    let total_credits: f64 = records.iter().map(|r| r.total_credits).sum();
    let total_cost = total_credits * credit_cost;
    let days_of_data = series.distinct_days();
    let services = service_breakdown(series, credit_cost);

    Ok(SummaryReport {
        total_credits,
        total_cost,
        days_of_data,
        avg_daily_cost: ratio_or_zero(total_cost, days_of_data as f64),
        active_services: services.len(),
        avg_daily_users: mean_daily_users(series),
        projection: AnnualProjection {
            growth_rate: projection.growth_rate,
            months: projection.months,
            total_cost: projection.total_cost,
            avg_monthly_cost: projection.total_cost / f64::from(projection.months),
            band: projection.band,
        },
        services,
    })
}

/// Per-service totals, largest credit consumer first.
pub fn service_breakdown(series: &CanonicalSeries, credit_cost: f64) -> Vec<ServiceBreakdown> {
    let mut acc: BTreeMap<&str, (f64, f64, u64, usize)> = BTreeMap::new();
    for r in series.records() {
        let entry = acc
            .entry(r.service_type.as_str())
            .or_insert((0.0, 0.0, 0, 0));
        entry.0 += r.total_credits;
        entry.1 += r.daily_unique_users;
        entry.2 += r.total_operations;
        entry.3 += 1;
    }

    let grand_total: f64 = acc.values().map(|v| v.0).sum();
    let mut rows: Vec<ServiceBreakdown> = acc
        .into_iter()
        .map(|(service, (credits, users, ops, rows))| ServiceBreakdown {
            service_type: service.to_string(),
            total_credits: credits,
            avg_daily_users: users / rows as f64,
            total_operations: ops,
            total_cost_usd: credits * credit_cost,
            pct_of_total: ratio_or_zero(credits, grand_total) * 100.0,
        })
        .collect();
    rows.sort_by(|a, b| b.total_credits.total_cmp(&a.total_credits));
    rows
}

fn mean_daily_users(series: &CanonicalSeries) -> f64 {
    let records = series.records();
    let users: f64 = records.iter().map(|r| r.daily_unique_users).sum();
    ratio_or_zero(users, records.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyServiceCredits {
    pub date: NaiveDate,
    pub service_type: String,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalOverview {
    pub total_credits: f64,
    pub total_cost: f64,
    pub avg_daily_credits: f64,
    pub avg_daily_users: f64,
    pub services: Vec<ServiceBreakdown>,
    pub daily: Vec<DailyServiceCredits>,
}

pub fn historical_overview(series: &CanonicalSeries, credit_cost: f64) -> HistoricalOverview {
    let records = series.records();
    let total_credits: f64 = records.iter().map(|r| r.total_credits).sum();

    let mut per_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in records {
        *per_date.entry(r.date).or_default() += r.total_credits;
    }

    HistoricalOverview {
        total_credits,
        total_cost: total_credits * credit_cost,
        avg_daily_credits: ratio_or_zero(per_date.values().sum(), per_date.len() as f64),
        avg_daily_users: mean_daily_users(series),
        services: service_breakdown(series, credit_cost),
        daily: records
            .iter()
            .map(|r| DailyServiceCredits {
                date: r.date,
                service_type: r.service_type.clone(),
                credits: r.total_credits,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{record, series};

    #[test]
    fn summary_totals_and_run_rate() {
        let s = series(vec![
            record(0, "llm", 10.0, 100, 60.0),
            record(0, "search", 2.0, 10, 20.0),
            record(1, "llm", 20.0, 200, 20.0),
        ]);
        let report = summarize(&s, 2.0, 0.1).expect("summary");
        assert_eq!(report.total_credits, 100.0);
        assert_eq!(report.total_cost, 200.0);
        assert_eq!(report.days_of_data, 2);
        assert_eq!(report.avg_daily_cost, 100.0);
        assert_eq!(report.active_services, 2);
        assert!((report.avg_daily_users - 32.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn annual_projection_matches_closed_form() {
        let s = series(vec![
            record(0, "llm", 10.0, 100, 60.0),
            record(1, "llm", 20.0, 200, 20.0),
            record(1, "search", 2.0, 10, 20.0),
        ]);
        let credit_cost = 3.0;
        let report = summarize(&s, credit_cost, 0.2).expect("summary");

        let expected: f64 = [80.0_f64, 20.0]
            .iter()
            .map(|baseline| {
                (1..=12)
                    .map(|m| baseline * 1.25_f64.powi(m) * credit_cost)
                    .sum::<f64>()
            })
            .sum();
        let total = report.projection.total_cost;
        assert!((total - expected).abs() < 1e-6 * expected);
        assert!((report.projection.band.lower - total * 0.8).abs() < 1e-6);
        assert!((report.projection.band.upper - total * 1.2).abs() < 1e-6);
        assert!((report.projection.avg_monthly_cost - total / 12.0).abs() < 1e-9);
    }

    #[test]
    fn breakdown_percentages_sum_to_one_hundred() {
        let s = series(vec![
            record(0, "a", 1.0, 1, 1.0),
            record(0, "b", 1.0, 1, 2.0),
            record(0, "c", 1.0, 1, 4.0),
        ]);
        let rows = service_breakdown(&s, 1.0);
        let pct: f64 = rows.iter().map(|r| r.pct_of_total).sum();
        assert!((pct - 100.0).abs() < 1e-9);
        assert_eq!(rows[0].service_type, "c");
        assert_eq!(rows[2].service_type, "a");
    }

    #[test]
    fn breakdown_is_zero_percent_without_credits() {
        let s = series(vec![record(0, "a", 1.0, 1, 0.0), record(0, "b", 1.0, 1, 0.0)]);
        let rows = service_breakdown(&s, 1.0);
        assert!(rows.iter().all(|r| r.pct_of_total == 0.0));
    }

    #[test]
    fn overview_averages_per_date_totals() {
        let s = series(vec![
            record(0, "llm", 4.0, 1, 6.0),
            record(0, "search", 2.0, 1, 4.0),
            record(1, "llm", 6.0, 1, 20.0),
        ]);
        let overview = historical_overview(&s, 0.5);
        assert_eq!(overview.total_credits, 30.0);
        assert_eq!(overview.total_cost, 15.0);
        assert_eq!(overview.avg_daily_credits, 15.0);
        assert_eq!(overview.avg_daily_users, 4.0);
        assert_eq!(overview.daily.len(), 3);
    }
}
