//! CLI-side configuration: profile lookup plus `GlobalOpts` overrides.
//!
//! Core never sees these types -- it receives a pre-built `ClientConfig`.

use std::time::Duration;

use secrecy::SecretString;

use ledgerlink_config::{Config, Profile, config_path, profile_to_client_config, resolve_password};
use ledgerlink_core::{ClientConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to reach the backend and sign in.
pub struct Resolved {
    pub client: ClientConfig,
    pub profile_name: String,
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

/// Resolve the active profile (if any) and apply CLI flag overrides.
pub fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<Resolved, CliError> {
    match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => from_profile(cfg, name, profile, global),

        Err(_) if global.profile.is_some() => Err(profile_not_found(cfg, global)),

        // No profile at all -- build from flags / env alone
        Err(_) => {
            let raw = global.base_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let mut client = ClientConfig::new(parse_base_url(raw)?);
            client.timeout = Duration::from_secs(cfg.defaults.timeout);
            client.cache_ttl = Duration::from_secs(cfg.defaults.cache_ttl_secs);
            if cfg.defaults.insecure {
                client.tls = TlsVerification::DangerAcceptInvalid;
            }
            apply_overrides(&mut client, global)?;

            Ok(Resolved {
                client,
                profile_name: "default".into(),
                email: global.email.clone(),
                password: global.password.clone().map(SecretString::from),
            })
        }
    }
}

fn from_profile(
    cfg: &Config,
    name: &str,
    profile: &Profile,
    global: &GlobalOpts,
) -> Result<Resolved, CliError> {
    let mut client = profile_to_client_config(profile, &cfg.defaults)?;
    apply_overrides(&mut client, global)?;

    let password = match global.password {
        Some(ref pw) => Some(SecretString::from(pw.clone())),
        None => resolve_password(profile, name).ok(),
    };

    Ok(Resolved {
        client,
        profile_name: name.to_owned(),
        email: global.email.clone().or_else(|| profile.email.clone()),
        password,
    })
}

fn apply_overrides(client: &mut ClientConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref raw) = global.base_url {
        let derived = ClientConfig::new(parse_base_url(raw)?);
        client.base_url = derived.base_url;
        client.realtime_url = derived.realtime_url;
    }
    if global.insecure {
        client.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        client.timeout = Duration::from_secs(secs);
    }
    Ok(())
}

fn parse_base_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "base-url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn profile_not_found(cfg: &Config, global: &GlobalOpts) -> CliError {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    CliError::ProfileNotFound {
        name: global.profile.clone().unwrap_or_default(),
        available: if names.is_empty() {
            "(none)".into()
        } else {
            names.join(", ")
        },
    }
}
