use crate::error::AppError;
use crate::models::CanonicalSeries;
use crate::normalize::{normalize, RawTable};
use chrono::{Duration, NaiveDate};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const MIN_LOOKBACK_DAYS: u32 = 7;
pub const MAX_LOOKBACK_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy)]
pub struct SourceContext {
    pub as_of: NaiveDate,
    pub lookback_days: u32,
}

impl SourceContext {
    pub fn since(&self) -> NaiveDate {
        self.as_of - Duration::days(i64::from(self.lookback_days))
    }
}

pub trait UsageSource {
    fn name(&self) -> String;

    fn fetch(&self, ctx: &SourceContext) -> Result<RawTable, AppError>;
}

/// Header-bearing CSV export of daily usage.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UsageSource for CsvFileSource {
    fn name(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn fetch(&self, _ctx: &SourceContext) -> Result<RawTable, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(RawTable::from_rows(headers, rows))
    }
}

/// A daily-summary view (or table) inside a SQLite database.
pub struct SqliteViewSource {
    path: PathBuf,
    view: String,
}

impl SqliteViewSource {
    pub fn new(path: impl Into<PathBuf>, view: &str) -> Result<Self, AppError> {
        validate_identifier(view)?;
        Ok(Self {
            path: path.into(),
            view: view.to_string(),
        })
    }
}

impl UsageSource for SqliteViewSource {
    fn name(&self) -> String {
        format!("sqlite:{}#{}", self.path.display(), self.view)
    }

    fn fetch(&self, ctx: &SourceContext) -> Result<RawTable, AppError> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let sql = format!(
            "SELECT usage_date, service_type, daily_unique_users, total_operations, total_credits
             FROM {} WHERE usage_date >= ?1 ORDER BY usage_date DESC",
            self.view
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([ctx.since().format("%Y-%m-%d").to_string()])?;

        let mut columns: Vec<(String, Vec<String>)> = [
            "DATE",
            "SERVICE_TYPE",
            "DAILY_UNIQUE_USERS",
            "TOTAL_OPERATIONS",
            "TOTAL_CREDITS",
        ]
        .into_iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect();
        while let Some(row) = rows.next()? {
            for (idx, (_, cells)) in columns.iter_mut().enumerate() {
                cells.push(cell_text(idx, row.get_ref(idx)?)?);
            }
        }
        Ok(RawTable::from_columns(columns))
    }
}

fn cell_text(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<String> {
    Ok(match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(_) => {
            return Err(rusqlite::Error::InvalidColumnType(
                idx,
                "blob".into(),
                rusqlite::types::Type::Blob,
            ))
        }
    })
}

fn validate_identifier(name: &str) -> Result<(), AppError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::Config(format!(
            "'{name}' is not a valid view name"
        )));
    }
    Ok(())
}

pub fn validate_lookback(days: u32) -> Result<(), AppError> {
    if !(MIN_LOOKBACK_DAYS..=MAX_LOOKBACK_DAYS).contains(&days) {
        return Err(AppError::Config(format!(
            "lookback must be between {MIN_LOOKBACK_DAYS} and {MAX_LOOKBACK_DAYS} days, got {days}"
        )));
    }
    Ok(())
}

/// Reads and normalizes a single source.
pub fn load(source: &dyn UsageSource, ctx: &SourceContext) -> Result<CanonicalSeries, AppError> {
    let table = source.fetch(ctx)?;
    debug!(source = %source.name(), rows = table.row_count(), "fetched usage rows");
    normalize(&table)
}

/// Tries `primary`, then `fallback` when the primary errors or has no rows.
///
/// Schema and format problems in rows that were returned still surface as-is;
/// only retrieval failures and empty results trigger the fallback.
pub fn load_with_fallback(
    primary: &dyn UsageSource,
    fallback: &dyn UsageSource,
    ctx: &SourceContext,
) -> Result<CanonicalSeries, AppError> {
    for (attempt, source) in [primary, fallback].into_iter().enumerate() {
        match source.fetch(ctx) {
            Ok(table) if table.row_count() > 0 => {
                info!(source = %source.name(), rows = table.row_count(), "loaded usage rows");
                return normalize(&table);
            }
            Ok(_) => warn!(source = %source.name(), attempt, "source returned no rows"),
            Err(e) => warn!(source = %source.name(), attempt, error = %e, "source query failed"),
        }
    }

    Err(AppError::EmptyInput(format!(
        "neither {} nor {} returned usage rows since {}",
        primary.name(),
        fallback.name(),
        ctx.since()
    )))
}
