//! Config subcommand handlers. None of these touch the network.

use std::io::{self, IsTerminal};

use dialoguer::Password;
use owo_colors::OwoColorize;
use secrecy::SecretString;

use ledgerlink_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::{CliError, prompt_err};
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            output::print_output(&list_profiles(&cfg, output::should_color()));
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
                available.sort_unstable();
                return Err(CliError::ProfileNotFound {
                    available: available.join(", "),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let profile = global.profile.clone().unwrap_or_else(|| {
                config::load_config_or_default()
                    .default_profile
                    .unwrap_or_else(|| "default".into())
            });
            let password = match global.password {
                Some(ref pw) => pw.clone(),
                None if io::stdin().is_terminal() => Password::new()
                    .with_prompt(format!("Password for '{profile}'"))
                    .with_confirmation("Confirm password", "Passwords do not match")
                    .interact()
                    .map_err(prompt_err)?,
                None => return Err(CliError::NoCredentials { profile }),
            };
            config::store_password(&profile, &SecretString::from(password))?;
            eprintln!("Password stored in the system keyring for '{profile}'");
            Ok(())
        }
    }
}

fn list_profiles(cfg: &Config, color: bool) -> String {
    let mut profiles: Vec<_> = cfg.profiles.iter().collect();
    profiles.sort_by(|a, b| a.0.cmp(b.0));
    profiles
        .into_iter()
        .map(|(name, profile)| {
            let url = &profile.base_url;
            let is_default = cfg.default_profile.as_ref() == Some(name);
            match (is_default, color) {
                (true, true) => format!("* {} {url}", name.green().bold()),
                (true, false) => format!("* {name} {url}"),
                (false, _) => format!("  {name} {url}"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_config::Profile;

    #[test]
    fn default_profile_is_marked() {
        let mut cfg = Config::default();
        cfg.default_profile = Some("prod".into());
        for (name, url) in [("prod", "https://bank.example"), ("local", "http://localhost:8080")] {
            cfg.profiles.insert(
                name.into(),
                Profile {
                    base_url: url.into(),
                    ..Profile::default()
                },
            );
        }

        assert_eq!(
            list_profiles(&cfg, false),
            "  local http://localhost:8080\n* prod https://bank.example"
        );
    }
}
