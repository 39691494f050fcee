mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;
use jobmgr::{Config, JobManager};

use clap::Parser;
use std::error;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = ArgParser::parse();
    let config = Config::load(&args.config)?;
    let manager = JobManager::init(config).await?;
    let client = ClientCli::new(manager.clone());

    let outcome = match args.sub_command {
        SubCommand::Run {
            id,
            input,
            args,
            wait_ms,
            json,
        } => {
            client
                .run_job(id, &input, &args, wait_ms.map(Duration::from_millis), json)
                .await
        }
        SubCommand::Save { id, input } => client.save_job(id, &input).await,
        SubCommand::Results { job_id, json } => client.show_result(&job_id, json).await,
        SubCommand::Input { job_id } => client.show_input(&job_id).await,
        SubCommand::Status { job_id } => client.query_status(&job_id).await,
        SubCommand::Sweep => client.sweep().await,
        SubCommand::Arguments => client.show_arguments(),
    };

    manager.shutdown().await;
    outcome
}
