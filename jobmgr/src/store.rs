use crate::error::{Error, Result};
use crate::types::{Job, JobId, OutputBlob};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const INPUT_FILE: &str = "input";
pub const RESULTS_FILE: &str = "results";
pub const ERRORS_FILE: &str = "errors";

/// On-disk representation of jobs: `<root>/<job id>/{input,results,errors}`.
///
/// The directory is the only persistent state of a job.
#[derive(Clone, Debug)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open a store rooted at `root`, creating it if needed. The root is
    /// canonicalized so job directories are always absolute.
    pub async fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = fs::canonicalize(root.as_ref()).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn results_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(RESULTS_FILE)
    }

    pub fn errors_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(ERRORS_FILE)
    }

    /// Create (or reuse) the job directory and write its input.
    ///
    /// `created_at` comes from the directory itself, so a reused directory
    /// keeps the time it was first created.
    pub async fn create(&self, id: &JobId, input: &str) -> io::Result<Job> {
        let dir = self.job_dir(id);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(INPUT_FILE), input).await?;
        let meta = fs::metadata(&dir).await?;
        let created_at = meta.created().or_else(|_| meta.modified())?;
        Ok(Job {
            id: id.clone(),
            dir,
            created_at,
        })
    }

    pub async fn exists(&self, id: &JobId) -> bool {
        fs::metadata(self.job_dir(id))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    pub async fn read_input(&self, id: &JobId) -> Result<String> {
        let bytes = self.read_artifact(id, INPUT_FILE).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn read_result(&self, id: &JobId) -> Result<OutputBlob> {
        self.read_artifact(id, RESULTS_FILE).await
    }

    pub async fn read_error(&self, id: &JobId) -> Result<OutputBlob> {
        self.read_artifact(id, ERRORS_FILE).await
    }

    async fn read_artifact(&self, id: &JobId, name: &str) -> Result<OutputBlob> {
        match fs::read(self.job_dir(id).join(name)).await {
            Ok(bytes) => Ok(bytes.into()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Create or truncate the result and error artifacts, returning them
    /// ready to be handed to a child process as stdout and stderr.
    pub async fn open_outputs(&self, id: &JobId) -> io::Result<(std::fs::File, std::fs::File)> {
        let results = fs::File::create(self.results_path(id)).await?;
        let errors = fs::File::create(self.errors_path(id)).await?;
        Ok((results.into_std().await, errors.into_std().await))
    }

    /// Append one line to the job's error artifact.
    pub async fn append_error(&self, id: &JobId, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.errors_path(id))
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }

    /// Remove the job directory's absolute path from tool output.
    pub fn sanitize(&self, id: &JobId, text: &str) -> String {
        let dir = self.job_dir(id);
        let dir = dir.to_string_lossy();
        let with_separator = format!("{}{}", dir, std::path::MAIN_SEPARATOR);
        text.replace(&with_separator, "").replace(dir.as_ref(), "")
    }
}
