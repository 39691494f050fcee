use crate::config::Config;
use crate::events::{ExitReason, Outcome};
use crate::store::{JobStore, INPUT_FILE};
use crate::types::{Job, JobId};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::{process, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Launches the external tool for a job and supervises it.
///
/// The soft timeout is passed to the tool so it can stop by itself; the hard
/// timeout is enforced here by killing and reaping the child.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    store: JobStore,
    tool_path: PathBuf,
    command_template: String,
    soft_timeout_argument: String,
    soft_timeout: String,
    hard_timeout: Duration,
}

impl ProcessRunner {
    pub fn new(config: &Config, store: JobStore) -> Self {
        Self {
            store,
            tool_path: config.tool_path.clone(),
            command_template: config.command_template.clone(),
            soft_timeout_argument: config.soft_timeout_argument.clone(),
            soft_timeout: config.soft_timeout.clone(),
            hard_timeout: config.hard_timeout(),
        }
    }

    /// Substitute the template, then append `args` and the default soft
    /// timeout unless `args` already carries one.
    pub fn command_line(&self, job: &Job, args: &[String]) -> Vec<String> {
        let command = self
            .command_template
            .replace("{0}", &job.dir.to_string_lossy())
            .replace("{1}", INPUT_FILE);
        let mut tokens: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        tokens.extend(args.iter().cloned());

        let flag = &self.soft_timeout_argument;
        let overridden = args
            .iter()
            .any(|arg| arg == flag || arg.starts_with(&format!("{}=", flag)));
        if !overridden {
            tokens.push(flag.clone());
            tokens.push(self.soft_timeout.clone());
        }
        tokens
    }

    /// Execute a job to completion. Never fails: launch problems are written
    /// to the job's error artifact and reported through the outcome.
    pub async fn run(&self, job: &Job, args: &[String], cancel: &CancellationToken) -> Outcome {
        let outcome = match self.launch(job, args).await {
            Ok(child) => self.supervise(&job.id, child, cancel).await,
            Err(err) => Outcome::with_diagnostic(
                ExitReason::LaunchFailed,
                format!("launch failed: {}", err),
            ),
        };
        if let Some(diagnostic) = &outcome.diagnostic {
            error!(job_id = %job.id, "{}", diagnostic);
            if let Err(err) = self.store.append_error(&job.id, diagnostic).await {
                warn!(job_id = %job.id, "could not record diagnostic: {}", err);
            }
        }
        info!(job_id = %job.id, reason = ?outcome.reason, "job finished");
        outcome
    }

    async fn launch(&self, job: &Job, args: &[String]) -> std::io::Result<process::Child> {
        let tokens = self.command_line(job, args);
        debug!(job_id = %job.id, command = %tokens.join(" "), "launching tool");
        let (program, rest) = tokens
            .split_first()
            .ok_or_else(|| std::io::Error::other("command template is empty"))?;

        // previous artifacts are truncated so re-runs start clean
        let (results, errors) = self.store.open_outputs(&job.id).await?;
        process::Command::new(program)
            .args(rest)
            .current_dir(&self.tool_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(results))
            .stderr(Stdio::from(errors))
            .kill_on_drop(true)
            .spawn()
    }

    async fn supervise(
        &self,
        job_id: &JobId,
        mut child: process::Child,
        cancel: &CancellationToken,
    ) -> Outcome {
        let started = Instant::now();

        let stop_reason = select! {
            exit_status = child.wait() => {
                return match exit_status {
                    Ok(status) => Outcome::new(exit_reason(status)),
                    Err(err) => Outcome::with_diagnostic(
                        ExitReason::Exited { code: -1 },
                        format!("waiting on tool failed: {}", err),
                    ),
                };
            }
            _ = tokio::time::sleep(self.hard_timeout) => {
                warn!(
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hard timeout elapsed, killing tool"
                );
                ExitReason::TimedOut
            }
            _ = cancel.cancelled() => {
                info!(job_id = %job_id, "job cancelled, killing tool");
                ExitReason::Cancelled
            }
        };

        // kill() also reaps the child so no zombie is left behind
        if let Err(err) = child.kill().await {
            warn!(job_id = %job_id, "kill failed: {}", err);
            let _ = child.wait().await;
        }
        Outcome::new(stop_reason)
    }
}

fn exit_reason(status: ExitStatus) -> ExitReason {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitReason::Exited { code },
        (None, Some(signal)) => ExitReason::Killed { signal },
        (None, None) => ExitReason::Exited { code: -1 },
    }
}
