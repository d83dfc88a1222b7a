// ── Session store ──
//
// Holds the current identity, credential, and denormalized profile for
// the lifetime of the process (the "tab"). Reads self-heal: anything that
// fails to parse or has expired is wiped and reported as absent.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::token::{self, Clock, SystemClock};

// ── Domain types ─────────────────────────────────────────────────────

/// Role tag carried by every credential.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    #[serde(alias = "user", alias = "CUSTOMER")]
    User,
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "manager")]
    Manager,
    #[serde(alias = "developer")]
    Developer,
}

/// Bearer token plus the identity it was issued to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub email: String,
    pub role: Role,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("email", &self.email)
            .field("role", &self.role)
            .finish()
    }
}

/// Profile fields the UI needs without a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, alias = "fullName")]
    pub name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default, alias = "isVerified", alias = "kycVerified")]
    pub verified: bool,
    #[serde(default)]
    pub balance: Option<f64>,
    /// Everything else the server sends about the user.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The active credential and its cached profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub credential: Credential,
    #[serde(default)]
    pub profile: Profile,
}

impl Session {
    pub fn new(credential: Credential, profile: Profile) -> Self {
        Self {
            credential,
            profile,
        }
    }

    pub fn email(&self) -> &str {
        &self.credential.email
    }

    pub fn role(&self) -> Role {
        self.credential.role
    }
}

// ── Storage medium ───────────────────────────────────────────────────

/// Where the serialized session lives. Implementations must be private to
/// one process/tab and must forget everything on `clear`.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, raw: String);
    fn clear(&self);
}

/// Process-lifetime, in-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, raw: String) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// ── SessionStore ─────────────────────────────────────────────────────

/// Outcome of inspecting persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Active(Arc<Session>),
    /// Nothing persisted.
    Absent,
    /// Something was persisted but unusable; it has now been wiped.
    Expired,
}

/// Current-session holder. Construct once and share behind an `Arc`.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    changes: watch::Sender<Option<Arc<Session>>>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            storage,
            clock,
            changes,
        }
    }

    /// In-memory storage, wall clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock))
    }

    /// The clock validity decisions are made against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read and validate persisted state, wiping it if unusable.
    pub fn status(&self) -> SessionStatus {
        let Some(raw) = self.storage.load() else {
            return SessionStatus::Absent;
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unreadable session");
                self.clear();
                return SessionStatus::Expired;
            }
        };

        if !token::is_session_valid(&session, self.clock.now()) {
            debug!(email = %session.credential.email, "discarding expired session");
            self.clear();
            return SessionStatus::Expired;
        }

        SessionStatus::Active(Arc::new(session))
    }

    /// The current session, if one exists and is still valid.
    pub fn get(&self) -> Option<Arc<Session>> {
        match self.status() {
            SessionStatus::Active(session) => Some(session),
            SessionStatus::Absent | SessionStatus::Expired => None,
        }
    }

    /// Persist `session` verbatim, replacing any previous one.
    pub fn set(&self, session: Session) {
        match serde_json::to_string(&session) {
            Ok(raw) => {
                self.storage.save(raw);
                self.changes.send_replace(Some(Arc::new(session)));
            }
            Err(e) => warn!(error = %e, "session could not be serialized; not stored"),
        }
    }

    /// Replace the profile of the current session, keeping its credential.
    /// Returns the updated session, or `None` if there is no valid session.
    pub fn update_profile(&self, profile: Profile) -> Option<Arc<Session>> {
        let current = self.get()?;
        let updated = Session::new(current.credential.clone(), profile);
        self.set(updated.clone());
        Some(Arc::new(updated))
    }

    /// Wipe all persisted session state.
    pub fn clear(&self) {
        self.storage.clear();
        self.changes.send_if_modified(|current| current.take().is_some());
    }

    /// Observe session changes (sign-in, profile refresh, sign-out).
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.changes.subscribe()
    }
}
