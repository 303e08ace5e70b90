use crate::config::{AppConfig, SourceSettings};
use crate::error::AppError;
use crate::export::{credit_estimates, CreditEstimate};
use crate::models::{CanonicalSeries, Persona, RollingAggregate};
use crate::persona::{
    blended_unit_cost, estimate_personas, select_usage, CostBasis, PersonaEstimate, ServiceUsage,
};
use crate::projection::{
    summarize_projection, validate_credit_cost, validate_variance, GrowthParams, ProjectionSummary,
};
use crate::rolling::{latest_per_service, rolling_aggregates};
use crate::scenario::{compare_scenarios, Scenario, ScenarioResult};
use crate::source::{load, load_with_fallback, CsvFileSource, SourceContext, SqliteViewSource};
use crate::summary::{historical_overview, summarize, HistoricalOverview, SummaryReport};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where one run's usage rows come from.
#[derive(Debug, Clone)]
pub enum InputSource {
    Csv(PathBuf),
    Database(PathBuf),
}

impl InputSource {
    /// An explicit file wins, then an explicit database, then the configured one.
    pub fn resolve(
        file: Option<&Path>,
        database: Option<&Path>,
        settings: &SourceSettings,
    ) -> Result<Self, AppError> {
        if let Some(path) = file {
            return Ok(Self::Csv(path.to_path_buf()));
        }
        database
            .map(Path::to_path_buf)
            .or_else(|| settings.database.clone())
            .map(Self::Database)
            .ok_or_else(|| {
                AppError::Config(
                    "No usage data source. Pass --file <csv> or --database <sqlite>, or set source.database in config."
                        .into(),
                )
            })
    }
}

/// A loaded series bound to the rates used to price it.
pub struct CostCalculator {
    series: CanonicalSeries,
    credit_cost: f64,
    variance: f64,
}

impl CostCalculator {
    pub fn new(
        series: CanonicalSeries,
        credit_cost: f64,
        variance: f64,
    ) -> Result<Self, AppError> {
        validate_credit_cost(credit_cost)?;
        validate_variance(variance)?;
        Ok(Self {
            series,
            credit_cost,
            variance,
        })
    }

    pub fn load(
        input: &InputSource,
        settings: &SourceSettings,
        ctx: &SourceContext,
        credit_cost: f64,
        variance: f64,
    ) -> Result<Self, AppError> {
        let series = match input {
            InputSource::Csv(path) => load(&CsvFileSource::new(path), ctx)?,
            InputSource::Database(path) => {
                let primary = SqliteViewSource::new(path, &settings.primary_view)?;
                let fallback = SqliteViewSource::new(path, &settings.fallback_view)?;
                load_with_fallback(&primary, &fallback, ctx)?
            }
        };
        info!(
            records = series.records().len(),
            services = series.service_types().len(),
            days = series.distinct_days(),
            first = ?series.first_date(),
            last = ?series.last_date(),
            "usage series ready"
        );
        Self::new(series, credit_cost, variance)
    }

    pub fn series(&self) -> &CanonicalSeries {
        &self.series
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn history(&self) -> HistoricalOverview {
        historical_overview(&self.series, self.credit_cost)
    }

    pub fn rolling(&self) -> Vec<RollingAggregate> {
        rolling_aggregates(&self.series)
    }

    pub fn latest_rolling(&self) -> Vec<RollingAggregate> {
        latest_per_service(&self.rolling())
    }

    pub fn project(&self, rate: f64, months: u32) -> Result<ProjectionSummary, AppError> {
        summarize_projection(
            &self.series,
            GrowthParams {
                rate,
                months,
                credit_cost: self.credit_cost,
            },
            self.variance,
        )
    }

    pub fn scenarios(
        &self,
        scenarios: &[Scenario],
        months: u32,
    ) -> Result<Vec<ScenarioResult>, AppError> {
        compare_scenarios(&self.series, scenarios, months, self.credit_cost)
    }

    pub fn summary(&self) -> Result<SummaryReport, AppError> {
        summarize(&self.series, self.credit_cost, self.variance)
    }

    /// Persona costs from the requested basis, or the rolling basis with a
    /// history fallback when none is requested.
    pub fn personas(&self, personas: &[Persona], basis: Option<CostBasis>) -> PersonaEstimate {
        let latest = self.latest_rolling();
        let (basis, usage) = match basis {
            Some(CostBasis::History) => {
                (CostBasis::History, ServiceUsage::from_history(&self.series))
            }
            Some(CostBasis::Rolling) => (CostBasis::Rolling, ServiceUsage::from_rolling(&latest)),
            None => select_usage(&latest, &self.series),
        };
        let unit = blended_unit_cost(basis, &usage, self.credit_cost);
        estimate_personas(unit, personas)
    }

    pub fn credit_estimates(&self) -> Vec<CreditEstimate> {
        credit_estimates(&self.series, self.credit_cost)
    }
}

/// Rates for a run: config values with per-invocation overrides applied.
pub fn effective_rates(
    cfg: &AppConfig,
    credit_cost: Option<f64>,
    variance_pct: Option<f64>,
) -> Result<(f64, f64), AppError> {
    let credit_cost = credit_cost.unwrap_or(cfg.credit_cost);
    validate_credit_cost(credit_cost)?;
    let variance_pct = variance_pct.unwrap_or(cfg.variance_pct);
    crate::config::validate_variance_pct(variance_pct)?;
    Ok((credit_cost, variance_pct / 100.0))
}
