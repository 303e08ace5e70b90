use crate::error::AppError;
use crate::models::Persona;
use crate::persona::{default_personas, PersonaRoster};
use crate::projection::validate_credit_cost;
use crate::scenario::{default_scenarios, Scenario};
use crate::source::validate_lookback;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SERVICE_NAME: &str = "credit-meter";
const ENV_PREFIX: &str = "CREDIT_METER";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("CREDIT_METER_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "creditmeter", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".credit-meter"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub lookback_days: u32,
    pub credit_cost: f64,
    pub variance_pct: f64,
    pub projection_months: u32,
    pub growth_rate_pct: f64,
    pub source: SourceSettings,
    pub scenarios: Vec<Scenario>,
    pub personas: Vec<Persona>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    pub primary_view: String,
    pub fallback_view: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            database: None,
            primary_view: "v_daily_usage_summary".into(),
            fallback_view: "daily_usage".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            credit_cost: 3.0,
            variance_pct: 10.0,
            projection_months: 12,
            growth_rate_pct: 25.0,
            source: SourceSettings::default(),
            scenarios: default_scenarios(),
            personas: default_personas(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_lookback(self.lookback_days)?;
        validate_credit_cost(self.credit_cost)?;
        if self.credit_cost < 0.01 {
            return Err(AppError::Config(format!(
                "credit_cost must be at least 0.01, got {}",
                self.credit_cost
            )));
        }
        validate_variance_pct(self.variance_pct)?;
        validate_projection_months(self.projection_months)?;
        validate_growth_pct(self.growth_rate_pct)?;
        PersonaRoster::from_personas(self.personas.clone())?;
        Ok(())
    }

    pub fn roster(&self) -> Result<PersonaRoster, AppError> {
        PersonaRoster::from_personas(self.personas.clone())
    }
}

pub fn validate_variance_pct(pct: f64) -> Result<(), AppError> {
    if !(5.0..=25.0).contains(&pct) {
        return Err(AppError::Config(format!(
            "variance_pct must be between 5 and 25, got {pct}"
        )));
    }
    Ok(())
}

pub fn validate_projection_months(months: u32) -> Result<(), AppError> {
    if !(3..=24).contains(&months) {
        return Err(AppError::Config(format!(
            "projection_months must be between 3 and 24, got {months}"
        )));
    }
    Ok(())
}

pub fn validate_growth_pct(pct: f64) -> Result<(), AppError> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(AppError::Config(format!(
            "growth rate must be between 0 and 100 percent, got {pct}"
        )));
    }
    Ok(())
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

/// Layers `CREDIT_METER_*` environment overrides on top of the config file.
/// Nested keys use `__`, e.g. `CREDIT_METER_SOURCE__PRIMARY_VIEW`.
fn load_layered(path: &Path) -> Result<AppConfig, AppError> {
    let settings = ::config::Config::builder()
        .add_source(
            ::config::File::from(path.to_path_buf())
                .format(::config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    let cfg = load_layered(&path)?;
    cfg.validate()?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(cfg)
}

/// Writes the file-backed settings. Environment overrides are not persisted,
/// so callers that mutate state re-read the file rather than the layered view.
pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    config.validate()?;
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn load_file_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(&path)?;
    let cfg: AppConfig = toml::from_str(&raw)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let cfg = AppConfig::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.variance_pct, 10.0);
        assert_eq!(cfg.growth_rate_pct, 25.0);
        assert_eq!(cfg.scenarios.len(), 4);
        assert_eq!(cfg.roster().expect("roster").personas().len(), 3);
    }

    #[test]
    fn validate_enforces_ranges() {
        let mut cfg = AppConfig {
            lookback_days: 120,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
        cfg.lookback_days = 30;
        cfg.variance_pct = 30.0;
        assert!(cfg.validate().is_err());
        cfg.variance_pct = 10.0;
        cfg.projection_months = 2;
        assert!(cfg.validate().is_err());
        cfg.projection_months = 12;
        cfg.credit_cost = 0.0;
        assert!(cfg.validate().is_err());
        cfg.credit_cost = 3.0;
        cfg.growth_rate_pct = 150.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn layered_load_reads_partial_file_and_fills_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
credit_cost = 2.5
projection_months = 6

[source]
primary_view = "usage_rollup"

[[personas]]
name = "Ops"
user_count = 3
requests_per_day = 12
"#,
        )
        .expect("write config");

        let cfg = load_layered(&path).expect("load");
        assert_eq!(cfg.credit_cost, 2.5);
        assert_eq!(cfg.projection_months, 6);
        assert_eq!(cfg.lookback_days, 30);
        assert_eq!(cfg.source.primary_view, "usage_rollup");
        assert_eq!(cfg.source.fallback_view, "daily_usage");
        assert_eq!(cfg.personas.len(), 1);
        assert_eq!(cfg.personas[0].name, "Ops");
        assert_eq!(cfg.scenarios, default_scenarios());
    }

    #[test]
    fn toml_round_trip_preserves_personas() {
        let cfg = AppConfig::default();
        let raw = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: AppConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(parsed, cfg);
    }
}
