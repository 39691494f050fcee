use crate::error::{Error, Result};
use crate::events::Outcome;
use crate::types::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;

type Done = watch::Receiver<Option<Outcome>>;

/// Registry entry for one in-flight job.
struct RunningTask {
    ticket: u64,
    cancel: CancellationToken,
    done: Done,
}

/// Concurrent map of job id to in-flight execution.
///
/// Membership is the single source of truth for "is this job still running".
/// The lock is only held for map operations, never across a job's execution.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<JobId, RunningTask>>,
    next_ticket: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<JobId, RunningTask>> {
        // entries stay consistent even if a holder panicked
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a new entry, failing if `id` is already running.
    ///
    /// The returned guard owns the entry: dropping it removes the entry (if it
    /// is still this registration's) and fires the completion signal.
    pub fn register(self: &Arc<Self>, id: &JobId) -> Result<TaskGuard> {
        let mut tasks = self.tasks();
        if tasks.contains_key(id) {
            return Err(Error::AlreadyRunning(id.clone()));
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        tasks.insert(
            id.clone(),
            RunningTask {
                ticket,
                cancel: cancel.clone(),
                done: done_rx,
            },
        );
        Ok(TaskGuard {
            registry: Arc::clone(self),
            id: id.clone(),
            ticket,
            cancel,
            done: done_tx,
            outcome: None,
        })
    }

    pub fn is_running(&self, id: &JobId) -> bool {
        self.tasks().contains_key(id)
    }

    /// Completion signal for a running job, or `None` if it is not registered.
    pub fn subscribe(&self, id: &JobId) -> Option<Completion> {
        self.tasks().get(id).map(|task| Completion {
            done: task.done.clone(),
        })
    }

    /// Cancel and unregister a job. Unknown ids are a no-op.
    pub fn cancel(&self, id: &JobId) -> bool {
        let removed = self.tasks().remove(id);
        match removed {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Unregister a job without cancelling it. Idempotent; the completion
    /// signal still fires only when the owning guard drops.
    pub fn remove(&self, id: &JobId) {
        self.tasks().remove(id);
    }

    /// Remove `id` only if it still belongs to the registration `ticket`, so a
    /// finishing worker never unregisters a newer submission of the same id.
    fn release(&self, id: &JobId, ticket: u64) {
        let mut tasks = self.tasks();
        if tasks.get(id).map_or(false, |task| task.ticket == ticket) {
            tasks.remove(id);
        }
    }

    /// Cancel every registered job, returning their ids.
    pub fn cancel_all(&self) -> Vec<JobId> {
        let drained: Vec<_> = self.tasks().drain().collect();
        drained
            .into_iter()
            .map(|(id, task)| {
                task.cancel.cancel();
                id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive ownership of one registry entry, held by the unit of work that
/// executes the job.
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    id: JobId,
    ticket: u64,
    cancel: CancellationToken,
    done: watch::Sender<Option<Outcome>>,
    outcome: Option<Outcome>,
}

impl TaskGuard {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record the outcome published to subscribers when the guard drops.
    pub fn finish(mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        // unregister before signalling, so woken subscribers observe absence
        self.registry.release(&self.id, self.ticket);
        self.done.send_replace(self.outcome.take());
    }
}

/// One-shot completion notification for a job.
#[derive(Clone)]
pub struct Completion {
    done: Done,
}

impl Completion {
    /// Wait for the job to leave the registry. Yields its outcome, or `None`
    /// when the worker ended without recording one.
    pub async fn wait(mut self) -> Option<Outcome> {
        let recorded = self
            .done
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        match recorded {
            Ok(outcome) => outcome,
            // sender dropped without an outcome
            Err(_) => self.done.borrow().clone(),
        }
    }

    /// Like [`Completion::wait`], bounded by `timeout`.
    pub async fn wait_timeout(
        self,
        timeout: Duration,
    ) -> std::result::Result<Option<Outcome>, Elapsed> {
        tokio::time::timeout(timeout, self.wait()).await
    }
}
