mod actors;
pub mod arguments;
pub mod config;
pub mod error;
pub mod events;
mod manager;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod store;
pub mod types;

pub use actors::janitor::{sweep, JanitorHandle};
pub use arguments::{ArgumentSchema, ArgumentSpec};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{ExitReason, JobStatus, Outcome};
pub use manager::JobManager;
pub use types::{JobId, RawResult};

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::path::Path;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(10);

    // the job input is a shell script and `sh` plays the external tool
    async fn manager(tmp: &Path, max_threads: usize, hard_timeout_ms: u64) -> JobManager {
        let json = format!(
            r#"{{
                "toolPath": "{tool}",
                "jobsDirectory": "{jobs}",
                "commandTemplate": "sh {{0}}/{{1}}",
                "maxThreads": "{max_threads}",
                "softTimeout": "10",
                "hardTimeout": "{hard_timeout_ms}"
            }}"#,
            tool = tmp.display(),
            jobs = tmp.join("jobs").display(),
            max_threads = max_threads,
            hard_timeout_ms = hard_timeout_ms,
        );
        JobManager::init(Config::from_json(&json).expect("valid config"))
            .await
            .expect("manager starts")
    }

    fn text(result: &RawResult) -> String {
        String::from_utf8_lossy(&result.data).into_owned()
    }

    #[tokio::test]
    async fn basic() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 2, 5_000).await;
        let job_id = manager
            .submit_job(None, "printf 'hello world!'", vec![])
            .await
            .expect("job submitted");
        assert!(job_id.is_transient());
        assert!(manager.is_running(&job_id));

        assert!(manager.wait_for_completion(&job_id, WAIT).await);
        assert!(!manager.is_running(&job_id));
        let result = manager.raw_result(&job_id).await.unwrap();
        assert!(result.finished);
        assert_eq!(text(&result), "hello world!");
        assert_eq!(manager.status(&job_id).await.unwrap(), JobStatus::Finished);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn result_is_partial_while_running_and_sanitized_when_finished() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 10_000).await;
        let id = JobId::parse("model").unwrap();
        let script = "echo \"parsing $0\"; sleep 1; echo \"error in $0\" >&2";
        manager
            .submit_job(Some(id.clone()), script, vec![])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let partial = manager.raw_result(&id).await.unwrap();
        assert!(!partial.finished);
        assert_eq!(text(&partial), "parsing input\n");
        assert_eq!(manager.status(&id).await.unwrap(), JobStatus::Running);

        let result = manager.await_result(&id, WAIT).await.unwrap();
        assert!(result.finished);
        assert_eq!(text(&result), "parsing input\nerror in input\n");
        assert!(!text(&result).contains(&tmp.path().display().to_string()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_and_saved_jobs_have_no_result() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 5_000).await;
        let unknown = JobId::parse("never-submitted").unwrap();
        assert!(matches!(
            manager.raw_result(&unknown).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            manager.status(&unknown).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            manager.await_result(&unknown, WAIT).await,
            Err(Error::NotFound(_))
        ));

        let saved = manager
            .save_job_only(Some(JobId::parse("kept").unwrap()), "(check-sat)")
            .await
            .unwrap();
        assert!(!manager.is_running(&saved));
        assert_eq!(manager.read_input(&saved).await.unwrap(), "(check-sat)");
        assert!(matches!(
            manager.raw_result(&saved).await,
            Err(Error::NotFound(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn resubmission_rejected_while_running_and_truncates_after() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 2, 10_000).await;
        let id = JobId::transient();
        manager
            .submit_job(Some(id.clone()), "echo first; sleep 1", vec![])
            .await
            .unwrap();
        assert!(matches!(
            manager.submit_job(Some(id.clone()), "echo second", vec![]).await,
            Err(Error::AlreadyRunning(_))
        ));
        assert!(matches!(
            manager.save_job_only(Some(id.clone()), "echo second").await,
            Err(Error::AlreadyRunning(_))
        ));
        assert!(manager.wait_for_completion(&id, WAIT).await);
        assert_eq!(text(&manager.raw_result(&id).await.unwrap()), "first\n");

        manager
            .submit_job(Some(id.clone()), "echo second", vec![])
            .await
            .expect("re-run after completion");
        let result = manager.await_result(&id, WAIT).await.unwrap();
        assert_eq!(text(&result), "second\n");
        manager.shutdown().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancel_removes_job_and_kills_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 60_000).await;
        let id = manager
            .submit_job(None, "echo $$; exec sleep 30", vec![])
            .await
            .unwrap();

        let store = manager.store().clone();
        let pid = loop {
            let written = store.read_result(&id).await.unwrap_or_default();
            let written = String::from_utf8_lossy(&written).trim().to_string();
            if !written.is_empty() {
                break written;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        let completion = manager.registry().subscribe(&id).expect("running");
        manager.cancel_job(&id);
        assert!(!manager.is_running(&id));
        let outcome = completion.wait_timeout(WAIT).await.expect("worker exits");
        assert_eq!(outcome, Some(Outcome::new(ExitReason::Cancelled)));
        assert!(!Path::new("/proc").join(&pid).exists(), "tool {} survived", pid);

        // cancelling again, or an unknown id, is a no-op
        manager.cancel_job(&id);
        manager.cancel_job(&JobId::parse("nope").unwrap());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn hard_timeout_bounds_wall_time() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 400).await;
        let started = Instant::now();
        let id = manager
            .submit_job(None, "echo partial; exec sleep 30", vec![])
            .await
            .unwrap();
        let result = manager.await_result(&id, WAIT).await.unwrap();
        assert!(result.finished);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(text(&result), "partial\n");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn launch_failure_finishes_job_with_error_text() {
        let tmp = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{"toolPath": "{}", "jobsDirectory": "{}", "commandTemplate": "./missing-tool {{0}}/{{1}}",
                "maxThreads": 1, "softTimeout": "1", "hardTimeout": 1000}}"#,
            tmp.path().display(),
            tmp.path().join("jobs").display()
        );
        let manager = JobManager::init(Config::from_json(&json).unwrap())
            .await
            .unwrap();
        let id = manager.submit_job(None, "x", vec![]).await.unwrap();
        let result = manager.await_result(&id, WAIT).await.unwrap();
        assert!(result.finished);
        assert!(text(&result).contains("launch failed"));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_max_threads() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 2, 10_000).await;
        let ids = join_all((0..5).map(|_| manager.submit_job(None, "sleep 0.5", vec![])))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(manager.registry().len(), 5);

        let mut peak = 0;
        while ids.iter().any(|id| manager.is_running(id)) {
            let active = manager.pool().active();
            assert!(active <= 2, "{} jobs ran at once", active);
            peak = peak.max(active);
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(peak, 2);
        assert!(manager.registry().is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 60_000).await;
        for _ in 0..3 {
            manager
                .submit_job(None, "exec sleep 30", vec![])
                .await
                .unwrap();
        }
        let started = Instant::now();
        manager.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(manager.registry().is_empty());
        assert_eq!(manager.pool().active(), 0);

        assert!(matches!(
            manager.submit_job(None, "echo late", vec![]).await,
            Err(Error::ShuttingDown)
        ));
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn janitor_sweeps_on_demand() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager(tmp.path(), 1, 5_000).await;
        // answered only once the startup sweep is done
        assert_eq!(manager.sweep_now().await, 0);
        let old = manager.save_job_only(None, "x").await.unwrap();
        let dir = manager.store().job_dir(&old);
        let four_days = Duration::from_secs(4 * 24 * 60 * 60);
        std::fs::File::open(&dir)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - four_days)
            .unwrap();

        assert_eq!(manager.sweep_now().await, 1);
        assert!(matches!(
            manager.raw_result(&old).await,
            Err(Error::NotFound(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn init_rejects_unusable_configuration() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let json = format!(
            r#"{{"toolPath": ".", "jobsDirectory": "{}", "commandTemplate": "sh {{0}}/{{1}}",
                "maxThreads": 1, "softTimeout": "1", "hardTimeout": 1000}}"#,
            blocker.join("jobs").display()
        );
        let config = Config::from_json(&json).unwrap();
        assert!(matches!(
            JobManager::init(config).await,
            Err(Error::Configuration(_))
        ));

        for tool_path in [tmp.path().join("missing"), blocker.clone()] {
            let json = format!(
                r#"{{"toolPath": "{}", "jobsDirectory": "{}", "commandTemplate": "sh {{0}}/{{1}}",
                    "maxThreads": 1, "softTimeout": "1", "hardTimeout": 1000}}"#,
                tool_path.display(),
                tmp.path().join("jobs").display()
            );
            let config = Config::from_json(&json).unwrap();
            assert!(matches!(
                JobManager::init(config).await,
                Err(Error::Configuration(_))
            ));
        }
    }
}
