use crate::error::AppError;
use crate::models::CanonicalSeries;
use crate::projection::{monthly_totals, project_growth, GrowthParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub rate: f64,
}

pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            label: "Conservative".into(),
            rate: 0.10,
        },
        Scenario {
            label: "Moderate".into(),
            rate: 0.25,
        },
        Scenario {
            label: "Aggressive".into(),
            rate: 0.50,
        },
        Scenario {
            label: "Rapid".into(),
            rate: 1.00,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub label: String,
    pub rate: f64,
    /// Total projected cost for months `1..=H`, index 0 is month 1.
    pub monthly_cost: Vec<f64>,
    pub total_cost: f64,
    pub final_month_cost: f64,
}

/// Projects each scenario independently, preserving input order.
///
/// Labels are keys and compare exactly, so `Base` and `base` are distinct.
pub fn compare_scenarios(
    series: &CanonicalSeries,
    scenarios: &[Scenario],
    months: u32,
    credit_cost: f64,
) -> Result<Vec<ScenarioResult>, AppError> {
    for (idx, s) in scenarios.iter().enumerate() {
        if scenarios[..idx]
            .iter()
            .any(|prev| prev.label == s.label)
        {
            return Err(AppError::Config(format!(
                "scenario '{}' is listed more than once",
                s.label
            )));
        }
    }

    scenarios
        .iter()
        .map(|s| {
            let params = GrowthParams {
                rate: s.rate,
                months,
                credit_cost,
            };
            let points = project_growth(series, params)?;
            let monthly_cost: Vec<f64> = monthly_totals(&points, months, 0.0)
                .into_iter()
                .map(|m| m.cost_usd)
                .collect();
            Ok(ScenarioResult {
                label: s.label.clone(),
                rate: s.rate,
                total_cost: monthly_cost.iter().sum(),
                final_month_cost: monthly_cost.last().copied().unwrap_or(0.0),
                monthly_cost,
            })
        })
        .collect()
}
