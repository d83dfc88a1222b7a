// ── Route guard ──
//
// Navigation gate for protected views. Re-reads the session store on every
// decision, so an expired credential is caught even between monitor ticks.

use std::sync::Arc;

use crate::session::{Role, Session, SessionStore};

/// What a protected view should do.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Render(Arc<Session>),
    RedirectToLogin,
    AccessDenied,
}

/// Role-membership check for one protected route.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    allowed: Vec<Role>,
}

impl RouteGuard {
    /// An empty role list admits any authenticated user.
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn any_authenticated() -> Self {
        Self::default()
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&role)
    }

    pub fn decide(&self, store: &SessionStore) -> RouteDecision {
        match store.get() {
            None => RouteDecision::RedirectToLogin,
            Some(session) if self.allows(session.role()) => RouteDecision::Render(session),
            Some(_) => RouteDecision::AccessDenied,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{Credential, Profile};
    use crate::token::test_tokens::token_expiring;
    use chrono::{Duration, Utc};

    fn signed_in(role: Role) -> SessionStore {
        let store = SessionStore::in_memory();
        store.set(Session::new(
            Credential {
                token: token_expiring(Utc::now() + Duration::hours(1)),
                email: "ana@bank.io".into(),
                role,
            },
            Profile::default(),
        ));
        store
    }

    #[test]
    fn no_session_redirects() {
        let guard = RouteGuard::any_authenticated();
        assert_eq!(guard.decide(&SessionStore::in_memory()), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn role_membership_decides_access() {
        let admin_only = RouteGuard::new([Role::Admin, Role::Manager]);

        assert!(matches!(
            admin_only.decide(&signed_in(Role::Manager)),
            RouteDecision::Render(_)
        ));
        assert_eq!(
            admin_only.decide(&signed_in(Role::User)),
            RouteDecision::AccessDenied
        );
    }

    #[test]
    fn empty_role_list_admits_everyone_signed_in() {
        let guard = RouteGuard::any_authenticated();
        assert!(matches!(
            guard.decide(&signed_in(Role::Developer)),
            RouteDecision::Render(_)
        ));
    }
}
