/// Externally visible job state. A job that is no longer registered is
/// `Finished`, whichever way it ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
}

/// Why a job's execution ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Exited { code: i32 },
    Killed { signal: i32 },
    /// The hard timeout elapsed and the supervisor killed the child.
    TimedOut,
    Cancelled,
    LaunchFailed,
}

/// Result of one execution. Never thrown past the worker boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub reason: ExitReason,
    pub diagnostic: Option<String>,
}

impl Outcome {
    pub fn new(reason: ExitReason) -> Self {
        Self {
            reason,
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(reason: ExitReason, diagnostic: impl Into<String>) -> Self {
        Self {
            reason,
            diagnostic: Some(diagnostic.into()),
        }
    }
}
