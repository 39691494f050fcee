use clap::{Parser, Subcommand};
use jobmgr::JobId;
use std::path::PathBuf;

/// Run and inspect analysis jobs
#[derive(Debug, Parser)]
#[clap(name = "jobctl")]
pub struct ArgParser {
    /// Path to the JSON configuration file
    #[clap(
        short = 'c',
        long = "config",
        env = "JOBCTL_CONFIG",
        default_value = "configurations.json"
    )]
    pub config: PathBuf,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum SubCommand {
    /// run a job and print its result once finished
    Run {
        #[clap(long)]
        /// job id to use; a transient id is generated when omitted
        id: Option<JobId>,

        #[clap(long, default_value = "-")]
        /// file holding the program text, `-` for stdin
        input: PathBuf,

        #[clap(long = "arg", multiple_occurrences = true, parse(try_from_str = name_eq_val))]
        /// tool arguments as NAME=VALUE, or NAME= for flags
        args: Vec<(String, String)>,

        #[clap(long)]
        /// give up waiting after this many milliseconds (default: hard timeout plus a margin)
        wait_ms: Option<u64>,

        #[clap(long)]
        /// print the result as JSON
        json: bool,
    },
    /// store a job's program text without running it
    Save {
        #[clap(long)]
        /// job id to use; a transient id is generated when omitted
        id: Option<JobId>,

        #[clap(long, default_value = "-")]
        /// file holding the program text, `-` for stdin
        input: PathBuf,
    },
    /// print a job's raw result
    Results {
        job_id: JobId,

        #[clap(long)]
        /// print the result as JSON
        json: bool,
    },
    /// print a job's program text
    Input { job_id: JobId },
    /// print whether a job is running or finished
    Status { job_id: JobId },
    /// delete expired transient jobs now
    Sweep,
    /// print the tool's argument schema
    Arguments,
}

/// try_from_str parse function for tool arguments
fn name_eq_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, val)) if !name.is_empty() => Ok((name.to_string(), val.to_string())),
        _ => Err("Required format is NAME=VALUE".to_string()),
    }
}
