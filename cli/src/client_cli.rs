use jobmgr::{JobId, JobManager, JobStatus, RawResult};
use std::error;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::warn;

type CliResult = Result<(), Box<dyn error::Error>>;

/// Slack on top of the hard timeout when waiting for `run` to finish.
const WAIT_MARGIN: Duration = Duration::from_secs(5);

pub struct ClientCli {
    manager: JobManager,
}

impl ClientCli {
    pub fn new(manager: JobManager) -> Self {
        Self { manager }
    }

    /// Submit a job and wait for it. Ctrl-C cancels the job.
    pub async fn run_job(
        &self,
        id: Option<JobId>,
        input: &Path,
        pairs: &[(String, String)],
        wait: Option<Duration>,
        json: bool,
    ) -> CliResult {
        let code = read_input(input).await?;
        let args = self
            .manager
            .arguments()
            .tokens(pairs.iter().map(|(name, val)| (name.as_str(), val.as_str())))?;
        let job_id = self.manager.submit_job(id, &code, args).await?;
        eprintln!("Started job id: {}", job_id);

        let wait = wait.unwrap_or_else(|| self.manager.config().hard_timeout() + WAIT_MARGIN);
        let result = tokio::select! {
            result = self.manager.await_result(&job_id, wait) => result?,
            _ = tokio::signal::ctrl_c() => {
                self.manager.cancel_job(&job_id);
                self.manager.wait_for_completion(&job_id, WAIT_MARGIN).await;
                eprintln!("Cancelled job id: {}", job_id);
                self.manager.raw_result(&job_id).await?
            }
        };
        if !result.finished {
            warn!(job_id = %job_id, "gave up waiting, output may be partial");
        }
        print_result(&result, json);
        Ok(())
    }

    pub async fn save_job(&self, id: Option<JobId>, input: &Path) -> CliResult {
        let code = read_input(input).await?;
        let job_id = self.manager.save_job_only(id, &code).await?;
        println!("{}", job_id);
        Ok(())
    }

    pub async fn show_result(&self, job_id: &JobId, json: bool) -> CliResult {
        let result = self.manager.raw_result(job_id).await?;
        print_result(&result, json);
        Ok(())
    }

    pub async fn show_input(&self, job_id: &JobId) -> CliResult {
        print!("{}", self.manager.read_input(job_id).await?);
        Ok(())
    }

    pub async fn query_status(&self, job_id: &JobId) -> CliResult {
        match self.manager.status(job_id).await? {
            JobStatus::Running => println!("Running"),
            JobStatus::Finished => println!("Finished"),
        }
        Ok(())
    }

    pub async fn sweep(&self) -> CliResult {
        let deleted = self.manager.sweep_now().await;
        println!("Deleted {} expired job(s)", deleted);
        Ok(())
    }

    pub fn show_arguments(&self) -> CliResult {
        println!(
            "{}",
            serde_json::to_string_pretty(self.manager.arguments())?
        );
        Ok(())
    }
}

async fn read_input(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut code = String::new();
        tokio::io::stdin().read_to_string(&mut code).await?;
        Ok(code)
    } else {
        tokio::fs::read_to_string(path).await
    }
}

fn print_result(result: &RawResult, json: bool) {
    let data = String::from_utf8_lossy(&result.data);
    if json {
        let body = serde_json::json!({
            "jobId": result.job_id.as_str(),
            "data": data,
            "jobFinished": result.finished,
        });
        println!("{}", body);
    } else {
        print!("{}", data);
    }
}
