use crate::events::{ExitReason, Outcome};
use crate::registry::TaskGuard;
use crate::runner::ProcessRunner;
use crate::types::{Args, Job};
use std::sync::Arc;
use tokio::{select, sync::Semaphore};
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Bounded executor for jobs.
///
/// At most `size` jobs run at once. Further submissions wait, in submission
/// order, for a free slot; the wait queue is unbounded.
pub struct ExecutorPool {
    size: usize,
    slots: Arc<Semaphore>,
    runner: Arc<ProcessRunner>,
    tracker: TaskTracker,
}

impl ExecutorPool {
    pub fn new(size: usize, runner: ProcessRunner) -> Self {
        Self {
            size,
            slots: Arc::new(Semaphore::new(size)),
            runner: Arc::new(runner),
            tracker: TaskTracker::new(),
        }
    }

    /// Enqueue a job. Returns immediately; the guard travels with the unit of
    /// work and unregisters the job on every exit path.
    pub fn submit(&self, job: Job, args: Args, guard: TaskGuard) {
        let slots = Arc::clone(&self.slots);
        let runner = Arc::clone(&self.runner);
        self.tracker
            .spawn(async move { work(slots, runner, job, args, guard).await });
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `true` once [`shutdown`](Self::shutdown) has started.
    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Number of jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.size.saturating_sub(self.slots.available_permits())
    }

    /// Stop admitting queued work and wait for every spawned unit to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.slots.close();
        self.tracker.wait().await;
    }
}

async fn work(
    slots: Arc<Semaphore>,
    runner: Arc<ProcessRunner>,
    job: Job,
    args: Args,
    guard: TaskGuard,
) {
    let token = guard.token().clone();
    let permit = select! {
        biased;
        _ = token.cancelled() => None,
        permit = slots.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        debug!(job_id = %job.id, "job cancelled before it started");
        guard.finish(Outcome::new(ExitReason::Cancelled));
        return;
    };

    let outcome = runner.run(&job, &args, &token).await;
    guard.finish(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::TaskRegistry;
    use crate::store::JobStore;
    use crate::types::JobId;
    use std::time::Duration;

    async fn pool(size: usize) -> (tempfile::TempDir, JobStore, ExecutorPool) {
        let tmp = tempfile::tempdir().unwrap();
        let store = JobStore::open(tmp.path()).await.unwrap();
        let config = Config::from_json(&format!(
            r#"{{"toolPath": "/", "jobsDirectory": "unused", "commandTemplate": "sh {{0}}/{{1}}",
                "maxThreads": {}, "softTimeout": "1", "hardTimeout": 10000}}"#,
            size
        ))
        .unwrap();
        let runner = ProcessRunner::new(&config, store.clone());
        (tmp, store, ExecutorPool::new(size, runner))
    }

    #[tokio::test]
    async fn queued_job_cancelled_before_start_never_runs() {
        let (_tmp, store, pool) = pool(1).await;
        let registry = TaskRegistry::new();

        let busy = JobId::parse("busy").unwrap();
        let job = store.create(&busy, "exec sleep 30").await.unwrap();
        pool.submit(job, vec![], registry.register(&busy).unwrap());

        let queued = JobId::parse("queued").unwrap();
        let job = store.create(&queued, "echo ran").await.unwrap();
        pool.submit(job, vec![], registry.register(&queued).unwrap());
        let completion = registry.subscribe(&queued).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.active(), 1);
        registry.cancel(&queued);
        let outcome = completion
            .wait_timeout(Duration::from_secs(2))
            .await
            .expect("cancelled promptly");
        assert_eq!(outcome, Some(Outcome::new(ExitReason::Cancelled)));
        assert!(store.read_result(&queued).await.is_err());

        registry.cancel_all();
        pool.shutdown().await;
        assert_eq!(pool.active(), 0);
        assert!(registry.is_empty());
    }
}
