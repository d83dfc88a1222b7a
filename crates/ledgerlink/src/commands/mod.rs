//! Command handlers. Everything here runs after sign-in.

pub mod auth;
pub mod config_cmd;
mod get;
mod loans;
mod watch;

use ledgerlink_core::Services;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a backend command to its handler.
pub async fn dispatch(cmd: Command, services: &Services, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Whoami => auth::whoami(services, global.output),
        Command::Loans(args) => loans::handle(args, services, global.output).await,
        Command::Get(args) => get::handle(args, services, global.output).await,
        Command::Watch => watch::handle(services, global.output).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled before sign-in".into(),
        }),
    }
}
