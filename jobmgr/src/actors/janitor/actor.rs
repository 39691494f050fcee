use super::messages::JanitorMessage;
use crate::registry::TaskRegistry;
use crate::types::{JobId, TRANSIENT_PREFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::{fs, select, sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<JanitorMessage>,
    shutdown: CancellationToken,
    root: PathBuf,
    interval: Duration,
    retention: Duration,
    registry: Arc<TaskRegistry>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<JanitorMessage>,
        shutdown: CancellationToken,
        root: PathBuf,
        interval: Duration,
        retention: Duration,
        registry: Arc<TaskRegistry>,
    ) {
        let actor = Self {
            inbox,
            shutdown,
            root,
            interval,
            retention,
            registry,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        // first sweep at startup, then every interval
        sweep(&self.root, self.retention, &self.registry).await;
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("janitor stopped");
                    return;
                }
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(JanitorMessage::SweepNow { response }) => {
                            let deleted = sweep(&self.root, self.retention, &self.registry).await;
                            let _ = response.send(deleted);
                        }
                        // every handle dropped
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    sweep(&self.root, self.retention, &self.registry).await;
                }
            }
        }
    }
}

/// Delete transient entries directly under `root` last modified more than
/// `retention` ago. Registered (running) jobs and entries without the
/// transient prefix are never touched. Individual failures are skipped.
pub async fn sweep(root: &Path, retention: Duration, registry: &TaskRegistry) -> usize {
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(cutoff) => cutoff,
        None => return 0,
    };
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %root.display(), "janitor cannot list jobs directory: {}", err);
            return 0;
        }
    };

    let mut deleted = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!("janitor listing interrupted: {}", err);
                break;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(TRANSIENT_PREFIX) {
            continue;
        }
        if let Ok(id) = JobId::parse(name.as_ref()) {
            if registry.is_running(&id) {
                continue;
            }
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let expired = metadata
            .modified()
            .map(|modified| modified < cutoff)
            .unwrap_or(false);
        if !expired {
            continue;
        }

        let path = entry.path();
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => {
                info!(path = %path.display(), "deleted expired job");
                deleted += 1;
            }
            Err(err) => warn!(path = %path.display(), "could not delete expired job: {}", err),
        }
    }
    deleted
}
