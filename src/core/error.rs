//! Error types for the exposure engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GexError {
    #[error("Data unavailable for {0}")]
    Unavailable(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Snapshot fetch for {ticker} timed out after {secs}s")]
    Timeout { ticker: String, secs: u64 },

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task error: {0}")]
    Task(String),
}

pub type GexResult<T> = Result<T, GexError>;

impl GexError {
    pub fn unavailable(ticker: impl Into<String>) -> Self {
        Self::Unavailable(ticker.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for GexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
