//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a distinct exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use ledgerlink_config::ConfigError;
use ledgerlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const UNAVAILABLE: i32 = 7;
    pub const MALFORMED: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Session expired or was refused: {reason}")]
    #[diagnostic(
        code(ledgerlink::auth_expired),
        help("Sign in again. If this repeats, check the password stored for this profile.")
    )]
    AuthExpired { reason: String },

    #[error("No email configured for profile '{profile}'")]
    #[diagnostic(
        code(ledgerlink::no_email),
        help("Pass --email, set LEDGERLINK_EMAIL, or add `email` to the profile.")
    )]
    NoEmail { profile: String },

    #[error("No password available for profile '{profile}'")]
    #[diagnostic(
        code(ledgerlink::no_credentials),
        help(
            "Store one with: ledgerlink config set-password --profile {profile}\n\
             Or set LEDGERLINK_PASSWORD, or `password_env` in the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Server responses ─────────────────────────────────────────────
    #[error("Request rejected (HTTP {status}): {message}")]
    #[diagnostic(code(ledgerlink::rejected))]
    Rejected { status: u16, message: String },

    #[error("Backend unavailable: {message}")]
    #[diagnostic(
        code(ledgerlink::unavailable),
        help("Check that the backend is reachable. Use --insecure for self-signed local servers.")
    )]
    Unavailable { message: String },

    #[error("Unexpected response from backend: {message}")]
    #[diagnostic(code(ledgerlink::malformed))]
    Malformed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ledgerlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ledgerlink::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(ledgerlink::no_config),
        help(
            "Pass --base-url, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ledgerlink::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(ledgerlink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthExpired { .. } | Self::NoEmail { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Unavailable { .. } => exit_code::UNAVAILABLE,
            Self::Malformed { .. } => exit_code::MALFORMED,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            Self::Config(_) | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthExpired { reason } => Self::AuthExpired { reason },
            CoreError::ValidationRejected { status, message } => Self::Rejected { status, message },
            CoreError::Unavailable { message } => Self::Unavailable { message },
            CoreError::Malformed { message } => Self::Malformed { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            other => Self::Config(other),
        }
    }
}
