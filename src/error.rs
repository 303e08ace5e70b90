use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("no data: {0}")]
    EmptyInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Settings(#[from] ::config::ConfigError),
}
