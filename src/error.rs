use thiserror::Error;

/// Failures reported by a Remote Data Provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network timeout")]
    Timeout,
    #[error("{0}")]
    Network(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// The raw dataset could not be turned into rows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("malformed gamma dataset: {0}")]
    Malformed(String),
    #[error("gamma dataset is missing `{0}`")]
    MissingField(&'static str),
    #[error("gamma dataset has an empty symbol")]
    EmptySymbol,
}

/// Everything that can end a fetch cycle. Never leaves the orchestrator; it is
/// folded into `LoadState::Failed` via [`failure_message`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("invalid symbol {0:?}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("invalid symbol {0:?} in settings")]
    InvalidSymbol(String),
    #[error("api.timeout_secs must be greater than zero")]
    InvalidTimeout,
    #[error("at least one column is required")]
    NoColumns,
}

/// User-facing text for a failed cycle: the error's own description, or a
/// templated message naming the symbol when that description is blank.
pub fn failure_message(err: &FetchError, attempted: &str) -> String {
    let text = err.to_string();
    if text.trim().is_empty() {
        fallback_message(attempted)
    } else {
        text
    }
}

/// Templated message used when a cycle ends with nothing better to report.
pub fn fallback_message(attempted: &str) -> String {
    format!("Failed to fetch gamma data for {attempted}. Please try again later.")
}
