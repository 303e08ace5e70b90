use crate::error::AppError;
use crate::models::{ratio_or_zero, CanonicalSeries, ProjectionPoint};
use serde::Serialize;
use std::collections::BTreeMap;

/// Full-history starting point for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub service_type: String,
    pub credits: f64,
    pub users: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthParams {
    pub rate: f64,
    pub months: u32,
    pub credit_cost: f64,
}

impl GrowthParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.rate.is_finite() || self.rate <= -1.0 {
            return Err(AppError::Config(format!(
                "growth rate must be a finite value above -100%, got {}",
                self.rate
            )));
        }
        if self.months == 0 {
            return Err(AppError::Config(
                "projection horizon must be at least one month".into(),
            ));
        }
        validate_credit_cost(self.credit_cost)
    }
}

pub fn validate_credit_cost(credit_cost: f64) -> Result<(), AppError> {
    if !credit_cost.is_finite() || credit_cost <= 0.0 {
        return Err(AppError::Config(format!(
            "credit cost must be a positive amount, got {credit_cost}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VarianceBand {
    pub lower: f64,
    pub upper: f64,
}

impl VarianceBand {
    pub fn around(value: f64, variance: f64) -> Self {
        Self {
            lower: value * (1.0 - variance),
            upper: value * (1.0 + variance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub month: u32,
    pub cost_usd: f64,
    pub band: VarianceBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionSummary {
    pub growth_rate: f64,
    pub months: u32,
    pub first_month_cost: f64,
    pub final_month_cost: f64,
    pub total_cost: f64,
    pub band: VarianceBand,
    pub monthly: Vec<MonthlyTotal>,
}

/// Per-service credit totals and mean daily users over the whole series.
pub fn baselines(series: &CanonicalSeries) -> Vec<Baseline> {
    let mut acc: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for r in series.records() {
        let entry = acc.entry(r.service_type.as_str()).or_insert((0.0, 0.0, 0));
        entry.0 += r.total_credits;
        entry.1 += r.daily_unique_users;
        entry.2 += 1;
    }
    acc.into_iter()
        .map(|(service, (credits, users, rows))| Baseline {
            service_type: service.to_string(),
            credits,
            users: users / rows as f64,
        })
        .collect()
}

/// Compounds every service baseline forward, month by month.
///
/// Users grow by the same factor as credits. Points are ordered by month,
/// then by service type.
pub fn project_growth(
    series: &CanonicalSeries,
    params: GrowthParams,
) -> Result<Vec<ProjectionPoint>, AppError> {
    params.validate()?;
    let base = baselines(series);
    let mut points = Vec::with_capacity(base.len() * params.months as usize);

    for month in 1..=params.months {
        let growth_factor = (1.0 + params.rate).powi(month as i32);
        for b in &base {
            let projected_credits = b.credits * growth_factor;
            let projected_users = b.users * growth_factor;
            let projected_cost_usd = projected_credits * params.credit_cost;
            points.push(ProjectionPoint {
                month,
                service_type: b.service_type.clone(),
                projected_credits,
                projected_users,
                projected_cost_usd,
                cost_per_user_usd: ratio_or_zero(projected_cost_usd, projected_users),
                growth_rate: params.rate,
            });
        }
    }

    Ok(points)
}

/// Sums projected cost across services for each month in `1..=months`.
pub fn monthly_totals(
    points: &[ProjectionPoint],
    months: u32,
    variance: f64,
) -> Vec<MonthlyTotal> {
    let mut totals = vec![0.0; months as usize];
    for p in points {
        if let Some(slot) = totals.get_mut(p.month as usize - 1) {
            *slot += p.projected_cost_usd;
        }
    }
    totals
        .into_iter()
        .enumerate()
        .map(|(idx, cost_usd)| MonthlyTotal {
            month: idx as u32 + 1,
            cost_usd,
            band: VarianceBand::around(cost_usd, variance),
        })
        .collect()
}

pub fn summarize_projection(
    series: &CanonicalSeries,
    params: GrowthParams,
    variance: f64,
) -> Result<ProjectionSummary, AppError> {
    validate_variance(variance)?;
    let points = project_growth(series, params)?;
    let monthly = monthly_totals(&points, params.months, variance);
    let total_cost: f64 = monthly.iter().map(|m| m.cost_usd).sum();

    Ok(ProjectionSummary {
        growth_rate: params.rate,
        months: params.months,
        first_month_cost: monthly.first().map_or(0.0, |m| m.cost_usd),
        final_month_cost: monthly.last().map_or(0.0, |m| m.cost_usd),
        total_cost,
        band: VarianceBand::around(total_cost, variance),
        monthly,
    })
}

pub fn validate_variance(variance: f64) -> Result<(), AppError> {
    if !(0.0..1.0).contains(&variance) {
        return Err(AppError::Config(format!(
            "variance must be within [0, 1), got {variance}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{record, series};

    fn params(rate: f64, months: u32) -> GrowthParams {
        GrowthParams {
            rate,
            months,
            credit_cost: 3.0,
        }
    }

    #[test]
    fn compounding_matches_closed_form() {
        let s = series(vec![
            record(0, "llm", 10.0, 1, 400.0),
            record(1, "llm", 30.0, 1, 600.0),
        ]);
        let points = project_growth(&s, params(0.25, 2)).expect("project");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].projected_credits, 1250.0);
        assert_eq!(points[1].projected_credits, 1562.5);
        assert_eq!(points[0].projected_users, 25.0);
        assert_eq!(points[0].projected_cost_usd, 3750.0);
        assert_eq!(points[0].cost_per_user_usd, 150.0);
        assert_eq!(points[1].growth_rate, 0.25);
    }

    #[test]
    fn credits_are_monotonic_for_non_negative_rates() {
        let s = series(vec![record(0, "llm", 1.0, 1, 10.0)]);
        for rate in [0.0, 0.1, 0.5, 1.0] {
            let points = project_growth(&s, params(rate, 24)).expect("project");
            for pair in points.windows(2) {
                if rate == 0.0 {
                    assert_eq!(pair[1].projected_credits, pair[0].projected_credits);
                } else {
                    assert!(pair[1].projected_credits > pair[0].projected_credits);
                }
            }
        }
    }

    #[test]
    fn one_point_per_month_and_service() {
        let s = series(vec![
            record(0, "search", 1.0, 1, 1.0),
            record(0, "llm", 1.0, 1, 1.0),
            record(1, "llm", 1.0, 1, 1.0),
        ]);
        let points = project_growth(&s, params(0.1, 3)).expect("project");
        let keys: Vec<_> = points
            .iter()
            .map(|p| (p.month, p.service_type.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, "llm"),
                (1, "search"),
                (2, "llm"),
                (2, "search"),
                (3, "llm"),
                (3, "search"),
            ]
        );
    }

    #[test]
    fn zero_users_give_zero_cost_per_user() {
        let s = series(vec![record(0, "batch", 0.0, 1, 10.0)]);
        let points = project_growth(&s, params(0.5, 1)).expect("project");
        assert_eq!(points[0].cost_per_user_usd, 0.0);
    }

    #[test]
    fn negative_rates_above_minus_one_are_allowed() {
        let s = series(vec![record(0, "llm", 1.0, 1, 100.0)]);
        let points = project_growth(&s, params(-0.5, 2)).expect("project");
        assert_eq!(points[1].projected_credits, 25.0);
        assert!(project_growth(&s, params(-1.0, 2)).is_err());
        assert!(project_growth(&s, params(f64::NAN, 2)).is_err());
        assert!(project_growth(&s, params(0.1, 0)).is_err());
    }

    #[test]
    fn summary_reports_first_final_and_band() {
        let s = series(vec![record(0, "llm", 1.0, 1, 100.0)]);
        let summary = summarize_projection(&s, params(1.0, 3), 0.1).expect("summary");
        assert_eq!(summary.first_month_cost, 600.0);
        assert_eq!(summary.final_month_cost, 2400.0);
        assert_eq!(summary.total_cost, 4200.0);
        assert!((summary.band.lower - 3780.0).abs() < 1e-9);
        assert!((summary.band.upper - 4620.0).abs() < 1e-9);
        assert_eq!(summary.monthly.len(), 3);
        assert!((summary.monthly[0].band.upper - 660.0).abs() < 1e-9);
    }

    #[test]
    fn variance_outside_unit_interval_is_rejected() {
        let s = series(vec![record(0, "llm", 1.0, 1, 100.0)]);
        assert!(summarize_projection(&s, params(0.1, 3), 1.0).is_err());
        assert!(summarize_projection(&s, params(0.1, 3), -0.1).is_err());
    }
}
