//! Error types for visionq.

use thiserror::Error;

use crate::model::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
