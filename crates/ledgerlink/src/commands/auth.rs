//! Sign-in (password + one-time passcode) and `whoami`.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use dialoguer::{Input, Password};
use secrecy::SecretString;
use serde::Serialize;

use ledgerlink_core::{LoginOutcome, Profile, Role, Services, Session};

use crate::cli::OutputFormat;
use crate::config::Resolved;
use crate::error::{CliError, prompt_err};
use crate::output;

/// Authenticate, prompting for the password and passcode when needed.
pub async fn sign_in(services: &Services, login: &Resolved) -> Result<Arc<Session>, CliError> {
    let email = login.email.clone().ok_or_else(|| CliError::NoEmail {
        profile: login.profile_name.clone(),
    })?;

    let password = match login.password {
        Some(ref pw) => pw.clone(),
        None => prompt_password(&login.profile_name)?,
    };

    match services.api.login(&email, &password).await? {
        LoginOutcome::Authenticated(session) => Ok(session),
        LoginOutcome::OtpRequired { email, message } => {
            if !io::stdin().is_terminal() {
                return Err(CliError::AuthExpired {
                    reason: "a one-time passcode is required but stdin is not interactive".into(),
                });
            }
            eprintln!(
                "{}",
                message.as_deref().unwrap_or("A one-time passcode was sent to your email.")
            );
            let otp: String = Input::new()
                .with_prompt("Passcode")
                .interact_text()
                .map_err(prompt_err)?;
            Ok(services.api.verify_otp(&email, otp.trim()).await?)
        }
    }
}

fn prompt_password(profile: &str) -> Result<SecretString, CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::NoCredentials {
            profile: profile.into(),
        });
    }
    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(prompt_err)?;
    Ok(SecretString::from(password))
}

/// The session minus its credential, for display.
#[derive(Serialize)]
struct Identity<'a> {
    email: &'a str,
    role: Role,
    #[serde(flatten)]
    profile: &'a Profile,
}

pub fn whoami(services: &Services, format: OutputFormat) -> Result<(), CliError> {
    let session = services.session.get().ok_or_else(|| CliError::AuthExpired {
        reason: "not signed in".into(),
    })?;
    let identity = Identity {
        email: session.email(),
        role: session.role(),
        profile: &session.profile,
    };

    let rendered = output::render_single(format, &identity, |id| {
        let profile = id.profile;
        let lines = [
            ("Email", id.email.to_owned()),
            ("Role", id.role.to_string()),
            ("Name", profile.name.clone().unwrap_or_else(|| "-".into())),
            ("Account", profile.account_number.clone().unwrap_or_else(|| "-".into())),
            ("Verified", if profile.verified { "yes" } else { "no" }.into()),
            (
                "Balance",
                profile.balance.map_or_else(|| "-".into(), |b| format!("{b:.2}")),
            ),
        ];
        lines
            .iter()
            .map(|(k, v)| format!("{k:<10} {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&rendered);
    Ok(())
}
