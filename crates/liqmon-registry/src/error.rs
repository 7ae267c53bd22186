//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
