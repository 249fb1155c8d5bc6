//! Error types for cadence-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid hash literal: {0}")]
    InvalidHash(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
