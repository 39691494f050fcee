use crate::types::JobId;
use std::{io, result};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("job {0} was not found")]
    NotFound(JobId),
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),
    #[error("invalid argument \"{name}: {value}\"")]
    InvalidArgument { name: String, value: String },
    #[error("job manager is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

pub type Result<T> = result::Result<T, Error>;
