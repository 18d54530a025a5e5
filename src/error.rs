use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsvqlError {
    #[error("Source read error: {0}")]
    SourceRead(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for CsvqlError {
    fn from(err: sqlx::Error) -> Self {
        CsvqlError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CsvqlError>;
