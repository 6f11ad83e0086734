use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResidenciasError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status} for table {table}: {body}")]
    Backend {
        table: String,
        status: u16,
        body: String,
    },
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error("could not understand the date '{0}' (expected dd/mm/yyyy or yyyy-mm-dd)")]
    InvalidDate(String),
    #[error("could not understand the amount '{0}'")]
    InvalidAmount(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ResidenciasError>;

impl From<anyhow::Error> for ResidenciasError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
