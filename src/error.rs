use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForgeError>;

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(format!("I/O error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Calendar error: {0}")]
    Calendar(String),
}
