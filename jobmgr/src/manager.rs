use crate::actors::janitor::JanitorHandle;
use crate::arguments::ArgumentSchema;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::pool::ExecutorPool;
use crate::registry::TaskRegistry;
use crate::runner::ProcessRunner;
use crate::store::JobStore;
use crate::types::{Args, JobId, RawResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Process-wide context: configuration, store, registry, pool and janitor,
/// built once by [`JobManager::init`] and shared by cloning.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    arguments: ArgumentSchema,
    store: JobStore,
    registry: Arc<TaskRegistry>,
    pool: ExecutorPool,
    janitor: JanitorHandle,
}

impl JobManager {
    /// Validate `config`, prepare the jobs directory, and start the worker
    /// pool and janitor. Must be called from within a tokio runtime.
    pub async fn init(config: Config) -> Result<Self> {
        config.validate()?;
        match tokio::fs::metadata(&config.tool_path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::config(format!(
                    "toolPath {} is not a directory",
                    config.tool_path.display()
                )))
            }
            Err(err) => {
                return Err(Error::config(format!(
                    "toolPath {} is unusable: {}",
                    config.tool_path.display(),
                    err
                )))
            }
        }
        let arguments = match &config.arguments_file {
            Some(path) => ArgumentSchema::load(path)?,
            None => ArgumentSchema::default(),
        };
        let store = JobStore::open(&config.jobs_directory).await.map_err(|err| {
            Error::config(format!(
                "jobs directory {} is unusable: {}",
                config.jobs_directory.display(),
                err
            ))
        })?;
        let registry = TaskRegistry::new();
        let pool = ExecutorPool::new(
            config.max_threads,
            ProcessRunner::new(&config, store.clone()),
        );
        let janitor = JanitorHandle::spawn(
            store.root().to_path_buf(),
            config.janitor_interval(),
            config.retention(),
            Arc::clone(&registry),
        );
        info!(
            jobs_directory = %store.root().display(),
            max_threads = pool.size(),
            "job manager started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                arguments,
                store,
                registry,
                pool,
                janitor,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Argument schema used by the request layer to build `args`.
    pub fn arguments(&self) -> &ArgumentSchema {
        &self.inner.arguments
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn pool(&self) -> &ExecutorPool {
        &self.inner.pool
    }

    /// Store `input` and queue the job for execution, returning its id once
    /// queued. A generated transient id is used when `id` is `None`.
    /// Fails with [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn submit_job(&self, id: Option<JobId>, input: &str, args: Args) -> Result<JobId> {
        if self.inner.pool.is_closed() {
            return Err(Error::ShuttingDown);
        }
        let id = id.unwrap_or_else(JobId::transient);
        // registering first keeps a running job's directory from being rewritten
        let guard = self.inner.registry.register(&id)?;
        let job = self.inner.store.create(&id, input).await?;
        info!(job_id = %id, "job submitted");
        self.inner.pool.submit(job, args, guard);
        Ok(id)
    }

    /// Store `input` without executing it.
    pub async fn save_job_only(&self, id: Option<JobId>, input: &str) -> Result<JobId> {
        let id = id.unwrap_or_else(JobId::transient);
        if self.inner.registry.is_running(&id) {
            return Err(Error::AlreadyRunning(id));
        }
        self.inner.store.create(&id, input).await?;
        info!(job_id = %id, "job saved");
        Ok(id)
    }

    /// Cancel a queued or running job. Unknown or finished ids are a no-op.
    ///
    /// The id is unregistered immediately, before the worker has killed and
    /// reaped the tool. A resubmission of the same id in that window is
    /// accepted, and the old tool may still write into the fresh `results`
    /// file until it exits. Callers that need the old run gone should take
    /// a [`TaskRegistry::subscribe`] handle before cancelling and wait on it.
    pub fn cancel_job(&self, id: &JobId) {
        if self.inner.registry.cancel(id) {
            info!(job_id = %id, "job cancelled");
        }
    }

    pub fn is_running(&self, id: &JobId) -> bool {
        self.inner.registry.is_running(id)
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatus> {
        if self.inner.registry.is_running(id) {
            Ok(JobStatus::Running)
        } else if self.inner.store.exists(id).await {
            Ok(JobStatus::Finished)
        } else {
            Err(Error::NotFound(id.clone()))
        }
    }

    pub async fn read_input(&self, id: &JobId) -> Result<String> {
        self.inner.store.read_input(id).await
    }

    /// Current output of a job: results followed by errors, with the job's
    /// absolute directory removed. Partial while `finished` is `false`.
    pub async fn raw_result(&self, id: &JobId) -> Result<RawResult> {
        let store = &self.inner.store;
        // sampled before reading so a finished flag always comes with complete data
        let finished = !self.inner.registry.is_running(id);
        if !store.exists(id).await {
            return Err(Error::NotFound(id.clone()));
        }

        let results = match store.read_result(id).await {
            Err(Error::NotFound(_)) if !finished => Default::default(),
            other => other?,
        };
        let errors = match store.read_error(id).await {
            Err(Error::NotFound(_)) => Default::default(),
            other => other?,
        };

        let mut text = String::from_utf8_lossy(&results).into_owned();
        text.push_str(&String::from_utf8_lossy(&errors));
        Ok(RawResult {
            job_id: id.clone(),
            data: store.sanitize(id, &text).into(),
            finished,
        })
    }

    /// Wait for a job to leave the registry. `true` once finished (immediately
    /// for unknown or finished ids), `false` if `timeout` elapsed first.
    pub async fn wait_for_completion(&self, id: &JobId, timeout: Duration) -> bool {
        match self.inner.registry.subscribe(id) {
            Some(completion) => completion.wait_timeout(timeout).await.is_ok(),
            None => true,
        }
    }

    /// Wait up to `timeout` for the job to finish, then read its result.
    pub async fn await_result(&self, id: &JobId, timeout: Duration) -> Result<RawResult> {
        if !self.inner.store.exists(id).await {
            return Err(Error::NotFound(id.clone()));
        }
        self.wait_for_completion(id, timeout).await;
        self.raw_result(id).await
    }

    /// Run a janitor sweep now, returning the number of deleted entries.
    pub async fn sweep_now(&self) -> usize {
        self.inner.janitor.sweep_now().await.unwrap_or(0)
    }

    /// Cancel every job, stop the janitor and wait for workers to clean up.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.registry.cancel_all();
        self.inner.janitor.stop();
        self.inner.pool.shutdown().await;
        info!(cancelled = cancelled.len(), "job manager stopped");
    }
}
