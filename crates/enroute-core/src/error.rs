use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrouteError {
    #[error("not initialized: run 'enroute init'")]
    NotInitialized,

    #[error("invalid airport code '{0}': must be non-empty ASCII alphanumeric")]
    InvalidAirportCode(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for EnrouteError {
    fn from(e: reqwest::Error) -> Self {
        EnrouteError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EnrouteError>;
