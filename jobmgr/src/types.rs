use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

pub type Args = Vec<String>;
pub type OutputBlob = bytes::Bytes;

/// Reserved prefix of generated job ids. Only directories carrying it are
/// eligible for janitor sweeps.
pub const TRANSIENT_PREFIX: &str = "temp-";

const MAX_ID_LEN: usize = 128;

/// A job identifier. Job ids double as directory names under the jobs root,
/// so construction goes through [`JobId::parse`] or [`JobId::transient`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    /// Generate a new transient id.
    pub fn transient() -> Self {
        Self(format!("{}{}", TRANSIENT_PREFIX, Uuid::new_v4()))
    }

    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if id.is_empty() || id.len() > MAX_ID_LEN || !valid_chars || id == "." || id == ".." {
            return Err(Error::InvalidJobId(id));
        }
        Ok(Self(id))
    }

    pub fn is_transient(&self) -> bool {
        self.0.starts_with(TRANSIENT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A job as it exists on disk.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub dir: PathBuf,
    pub created_at: SystemTime,
}

/// Read projection of a job's output, computed on demand.
#[derive(Clone, Debug)]
pub struct RawResult {
    pub job_id: JobId,
    pub data: OutputBlob,
    /// `false` while the job is still registered as running; `data` may then be partial.
    pub finished: bool,
}
