pub mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use cli::*;
use common::logger::{RunId, init_logger};
use counters::{CounterClient, CounterError, InMemoryBackend};
use driver::execute;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_logs = std::env::var("APP_ENV").is_ok_and(|v| v == "production");
    init_logger("counterbench", json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            match e.downcast_ref::<CounterError>() {
                Some(ce) => {
                    eprintln!("hint: {}", ce.remediation());
                    ExitCode::from(exit_status(ce))
                }
                None => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli).context("invalid configuration")?;

    let backend = Arc::new(InMemoryBackend::new());
    provision_backend(&backend, &config, &cli.provision).context("provisioning failed")?;

    let run_id = RunId::new();
    info!(%run_id, mode = %config.mode, "starting run");

    let client = CounterClient::new(Arc::clone(&backend));
    let report = execute(client, &config, run_id)
        .await
        .with_context(|| format!("{} run failed", config.mode))?;
    backend.shutdown();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
