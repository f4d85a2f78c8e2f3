use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{0} is billed and can no longer be changed")]
    Immutable(String),

    #[error("Cannot move invoice from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No exchange rate available for {0}")]
    RateUnavailable(String),

    #[error("Store rejected the write: {0}")]
    Commit(String),

    #[error("Render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
