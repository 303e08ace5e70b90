use crate::error::AppError;
use crate::models::{ratio_or_zero, CanonicalSeries, Persona, RollingAggregate};
use crate::rolling::ROLLING_WINDOW;
use serde::Serialize;
use std::collections::BTreeMap;

const DAYS_PER_MONTH: f64 = 30.0;

/// Where per-service unit costs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBasis {
    Rolling,
    History,
}

impl CostBasis {
    pub fn as_label(self) -> &'static str {
        match self {
            CostBasis::Rolling => "rolling 30-record window",
            CostBasis::History => "full history",
        }
    }
}

/// Operations and credits observed for one service over `days`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUsage {
    pub service_type: String,
    pub operations: f64,
    pub credits: f64,
    pub days: f64,
}

impl ServiceUsage {
    pub fn from_rolling(latest: &[RollingAggregate]) -> Vec<Self> {
        latest
            .iter()
            .map(|a| Self {
                service_type: a.service_type.clone(),
                operations: a.operations_30d_total as f64,
                credits: a.credits_30d_total,
                days: ROLLING_WINDOW as f64,
            })
            .collect()
    }

    /// Whole-series totals per service, spread over the distinct days present.
    pub fn from_history(series: &CanonicalSeries) -> Vec<Self> {
        let days = series.distinct_days() as f64;
        let mut acc: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        for r in series.records() {
            let entry = acc.entry(r.service_type.as_str()).or_insert((0.0, 0.0));
            entry.0 += r.total_operations as f64;
            entry.1 += r.total_credits;
        }
        acc.into_iter()
            .map(|(service, (operations, credits))| Self {
                service_type: service.to_string(),
                operations,
                credits,
                days,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceUnitCost {
    pub service_type: String,
    pub daily_requests: f64,
    pub cost_per_request: f64,
    pub monthly_operations: f64,
    pub monthly_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitCost {
    pub basis: CostBasis,
    pub avg_cost_per_request: f64,
    pub total_monthly_operations: f64,
    pub total_monthly_cost: f64,
    pub services: Vec<ServiceUnitCost>,
}

/// Picks the rolling basis when aggregates exist, full history otherwise.
pub fn select_usage(
    latest: &[RollingAggregate],
    series: &CanonicalSeries,
) -> (CostBasis, Vec<ServiceUsage>) {
    if latest.is_empty() {
        (CostBasis::History, ServiceUsage::from_history(series))
    } else {
        (CostBasis::Rolling, ServiceUsage::from_rolling(latest))
    }
}

/// Blends per-service request costs into a single cost per request,
/// weighted by each service's monthly request volume.
pub fn blended_unit_cost(basis: CostBasis, usage: &[ServiceUsage], credit_cost: f64) -> UnitCost {
    let services: Vec<ServiceUnitCost> = usage
        .iter()
        .map(|u| {
            let daily_requests = ratio_or_zero(u.operations, u.days);
            let cost_per_request = ratio_or_zero(u.credits * credit_cost, u.operations);
            let monthly_operations = daily_requests * DAYS_PER_MONTH;
            ServiceUnitCost {
                service_type: u.service_type.clone(),
                daily_requests,
                cost_per_request,
                monthly_operations,
                monthly_cost: monthly_operations * cost_per_request,
            }
        })
        .collect();

    let total_monthly_operations: f64 = services.iter().map(|s| s.monthly_operations).sum();
    let total_monthly_cost: f64 = services.iter().map(|s| s.monthly_cost).sum();

    UnitCost {
        basis,
        avg_cost_per_request: ratio_or_zero(total_monthly_cost, total_monthly_operations),
        total_monthly_operations,
        total_monthly_cost,
        services,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaCost {
    pub name: String,
    pub user_count: u32,
    pub requests_per_day: u32,
    pub monthly_requests: f64,
    pub cost_per_user_monthly: f64,
    pub total_cost_monthly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaEstimate {
    pub unit_cost: UnitCost,
    pub personas: Vec<PersonaCost>,
    pub total_users: u64,
    pub total_monthly_cost: f64,
    pub total_monthly_requests: f64,
    pub avg_cost_per_user: f64,
}

pub fn estimate_personas(unit_cost: UnitCost, personas: &[Persona]) -> PersonaEstimate {
    let rows: Vec<PersonaCost> = personas
        .iter()
        .map(|p| {
            let monthly_requests = f64::from(p.requests_per_day) * DAYS_PER_MONTH;
            let cost_per_user_monthly = monthly_requests * unit_cost.avg_cost_per_request;
            PersonaCost {
                name: p.name.clone(),
                user_count: p.user_count,
                requests_per_day: p.requests_per_day,
                monthly_requests,
                cost_per_user_monthly,
                total_cost_monthly: cost_per_user_monthly * f64::from(p.user_count),
            }
        })
        .collect();

    let total_users: u64 = rows.iter().map(|r| u64::from(r.user_count)).sum();
    let total_monthly_cost: f64 = rows.iter().map(|r| r.total_cost_monthly).sum();
    let total_monthly_requests: f64 = rows
        .iter()
        .map(|r| r.monthly_requests * f64::from(r.user_count))
        .sum();

    PersonaEstimate {
        unit_cost,
        personas: rows,
        total_users,
        total_monthly_cost,
        total_monthly_requests,
        avg_cost_per_user: ratio_or_zero(total_monthly_cost, total_users as f64),
    }
}

/// Operator-maintained persona list. The caller owns it and hands a
/// snapshot to [`estimate_personas`] on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaRoster {
    personas: Vec<Persona>,
}

impl Default for PersonaRoster {
    fn default() -> Self {
        Self {
            personas: default_personas(),
        }
    }
}

pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona {
            name: "Casual".into(),
            user_count: 50,
            requests_per_day: 10,
        },
        Persona {
            name: "Regular".into(),
            user_count: 25,
            requests_per_day: 40,
        },
        Persona {
            name: "Power".into(),
            user_count: 5,
            requests_per_day: 150,
        },
    ]
}

impl PersonaRoster {
    pub fn from_personas(personas: Vec<Persona>) -> Result<Self, AppError> {
        let mut roster = Self { personas: vec![] };
        for p in personas {
            roster.add(p)?;
        }
        Ok(roster)
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn into_personas(self) -> Vec<Persona> {
        self.personas
    }

    pub fn add(&mut self, persona: Persona) -> Result<(), AppError> {
        let name = validate_name(&persona.name)?;
        if self.position(&name).is_some() {
            return Err(AppError::Config(format!("persona '{name}' already exists")));
        }
        validate_positive("user count", persona.user_count)?;
        validate_positive("requests per day", persona.requests_per_day)?;
        self.personas.push(Persona { name, ..persona });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Persona, AppError> {
        let idx = self.require(name)?;
        Ok(self.personas.remove(idx))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), AppError> {
        let idx = self.require(from)?;
        let to = validate_name(to)?;
        if matches!(self.position(&to), Some(other) if other != idx) {
            return Err(AppError::Config(format!("persona '{to}' already exists")));
        }
        self.personas[idx].name = to;
        Ok(())
    }

    pub fn set_user_count(&mut self, name: &str, user_count: u32) -> Result<(), AppError> {
        validate_positive("user count", user_count)?;
        let idx = self.require(name)?;
        self.personas[idx].user_count = user_count;
        Ok(())
    }

    pub fn set_requests_per_day(&mut self, name: &str, requests: u32) -> Result<(), AppError> {
        validate_positive("requests per day", requests)?;
        let idx = self.require(name)?;
        self.personas[idx].requests_per_day = requests;
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.personas
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    fn require(&self, name: &str) -> Result<usize, AppError> {
        self.position(name)
            .ok_or_else(|| AppError::Config(format!("unknown persona '{}'", name.trim())))
    }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("persona name cannot be blank".into()));
    }
    Ok(trimmed.to_string())
}

fn validate_positive(field: &str, value: u32) -> Result<(), AppError> {
    if value == 0 {
        return Err(AppError::Config(format!("{field} must be positive")));
    }
    Ok(())
}
