//! Error types for Magpie

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
