//! `workflow-ops`: one-shot maintenance and reporting commands for the workflow database.

use std::{io, process::ExitCode};

use clap::{Parser, Subcommand};
use db::DBService;
use tracing::error;
use utils::{config::Config, logging::init_tracing};

mod commands;

/// The binary's crate is `workflow_ops`, so that is the target its own logs carry
const DEFAULT_LOG_DIRECTIVES: &str = "warn,workflow_ops=info";

#[derive(Parser, Debug)]
#[command(name = "workflow-ops")]
#[command(about = "Maintenance and reporting for project workflow tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum Command {
    /// Apply pending migrations and seed the workflow catalog
    Migrate,
    /// Print every project's completion percentage and phase
    CheckTrackers,
    /// List WORKFLOW_ALERT notifications and check their payloads
    VerifyAlerts,
    /// List workflow step ids and check catalog / tracker integrity
    CheckStepIds,
    /// Run one overdue line item scan and report what was raised
    ScanAlerts,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(DEFAULT_LOG_DIRECTIVES);
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db = DBService::connect(&config.database_url).await?;

    let mut stdout = io::stdout().lock();
    let result = commands::execute(command, &db, &mut stdout).await;

    db.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_match_crate_target() {
        let crate_target = module_path!().split("::").next().unwrap();
        assert_eq!(crate_target, "workflow_ops");
        assert!(
            DEFAULT_LOG_DIRECTIVES
                .split(',')
                .any(|d| d == format!("{crate_target}=info"))
        );
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["workflow-ops", "scan-alerts"]).unwrap();
        assert!(matches!(cli.command, Command::ScanAlerts));
        assert!(Cli::try_parse_from(["workflow-ops"]).is_err());
    }
}
