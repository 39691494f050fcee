mod actor;
mod messages;

pub use self::actor::sweep;

use self::{actor::Actor, messages::JanitorMessage};
use crate::registry::TaskRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Periodic deletion of expired transient job directories.
///
/// This struct is a handle; the sweeps run in the actor spawned by
/// `JanitorHandle::spawn`. The actor stops when `stop` is called or when every
/// handle has been dropped.
#[derive(Clone)]
pub struct JanitorHandle {
    sender: mpsc::UnboundedSender<JanitorMessage>,
    shutdown: CancellationToken,
}

impl JanitorHandle {
    /// Spawn the janitor. The first sweep runs at startup, then once per `interval`.
    /// Messages are only served after the startup sweep.
    pub fn spawn(
        root: PathBuf,
        interval: Duration,
        retention: Duration,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        Actor::spawn(inbox, shutdown.clone(), root, interval, retention, registry);
        Self { sender, shutdown }
    }

    /// Sweep now. `None` if the janitor has stopped.
    pub async fn sweep_now(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(JanitorMessage::SweepNow { response: tx })
            .ok()?;
        rx.await.ok()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}
