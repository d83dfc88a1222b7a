// ── Core error taxonomy ──
//
// Four classes every caller branches on: the session is gone, the server
// said no, the server could not be reached, or the server answered with
// something undecodable. Transport details never leak past this point;
// the `From<ledgerlink_api::Error>` impl does the classification.
//
// `Clone` is load-bearing: a de-duplicated read hands the same settled
// outcome to every joiner.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Credential missing, expired, or refused (401/403). The session has
    /// already been cleared and a redirect signal emitted by the time a
    /// caller sees this.
    #[error("Session expired -- sign in again ({reason})")]
    AuthExpired { reason: String },

    /// Any other 4xx. `message` is the server's text, verbatim.
    #[error("{message}")]
    ValidationRejected { status: u16, message: String },

    /// No usable response: network failure, timeout, 5xx, broken realtime link.
    #[error("Service unavailable: {message}")]
    Unavailable { message: String },

    /// The server answered but the body could not be decoded.
    #[error("Malformed response: {message}")]
    Malformed { message: String },

    /// Invalid local configuration (bad URL, unreadable CA, etc.)
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` for the session-invalidating class.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }

    /// Returns `true` if repeating the same call may succeed.
    ///
    /// Malformed bodies count as retryable: they are never cached, so the
    /// next attempt goes back to the network.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Malformed { .. })
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ledgerlink_api::Error> for CoreError {
    fn from(err: ledgerlink_api::Error) -> Self {
        use ledgerlink_api::Error as Api;

        match err {
            Api::Unauthorized { status, message } => CoreError::AuthExpired {
                reason: format!("HTTP {status}: {message}"),
            },
            Api::Rejected { status, message } => CoreError::ValidationRejected { status, message },
            Api::Server { status, message } => CoreError::Unavailable {
                message: format!("HTTP {status}: {message}"),
            },
            Api::Transport(e) => CoreError::Unavailable {
                message: e.to_string(),
            },
            Api::Deserialization { message, body: _ } => CoreError::Malformed { message },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            Api::InvalidHeader(e) => CoreError::Config {
                message: format!("Invalid header value: {e}"),
            },
            Api::WebSocketConnect(reason) => CoreError::Unavailable {
                message: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::Unavailable {
                message: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Stomp { message } => CoreError::Unavailable {
                message: format!("STOMP error: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlink_api::Error as Api;

    #[test]
    fn unauthorized_maps_to_auth_expired() {
        let err = CoreError::from(Api::Unauthorized {
            status: 403,
            message: "Forbidden".into(),
        });
        assert!(err.is_auth_expired());
        assert!(!err.is_retryable());
    }

    #[test]
    fn rejected_keeps_message_verbatim() {
        let err = CoreError::from(Api::Rejected {
            status: 422,
            message: "Amount exceeds limit".into(),
        });
        assert_eq!(err.to_string(), "Amount exceeds limit");
        assert_eq!(
            err,
            CoreError::ValidationRejected {
                status: 422,
                message: "Amount exceeds limit".into()
            }
        );
    }

    #[test]
    fn server_and_decode_failures_are_retryable() {
        let unavailable = CoreError::from(Api::Server {
            status: 502,
            message: "Bad Gateway".into(),
        });
        let malformed = CoreError::from(Api::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        });
        assert!(unavailable.is_retryable());
        assert!(malformed.is_retryable());
        assert!(matches!(malformed, CoreError::Malformed { .. }));
    }
}
