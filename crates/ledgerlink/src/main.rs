mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledgerlink_core::Services;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a backend
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "ledgerlink", &mut std::io::stdout());
            Ok(())
        }

        // Everything else signs in first
        cmd => {
            let cfg = ledgerlink_config::load_config_or_default();
            let resolved = config::resolve(&cfg, &cli.global)?;
            let services = Services::new(resolved.client.clone())?;
            let spinner = output::attach_spinner(&services.loading);

            let session = commands::auth::sign_in(&services, &resolved).await?;
            tracing::debug!(email = %session.email(), command = ?cmd, "dispatching command");

            let result = commands::dispatch(cmd, &services, &cli.global).await;
            if let Some(spinner) = spinner {
                spinner.unsubscribe();
            }
            result
        }
    }
}
