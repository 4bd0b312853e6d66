//! Session lifecycle
//!
//! The backend hands out a short-lived access token via `/api/auth/session`,
//! with the expiry encoded as a fixed-format timestamp string. Staleness is
//! evaluated lazily before each request; an unparsable expiry is collapsed
//! into "stale" so the worst case is an extra refresh, never a request sent
//! with a dead token.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout of the `expires` field, e.g. `2023-03-01T18:04:05.999Z`.
const SESSION_EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Identity record attached to the session. Opaque to this client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Response of `GET /api/auth/session`, kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub expires: String,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

impl Session {
    /// Whether the session's expiry has passed. An expiry string that does
    /// not parse with the vendor format also counts as expired.
    pub fn is_expired(&self) -> bool {
        match NaiveDateTime::parse_from_str(&self.expires, SESSION_EXPIRES_FORMAT) {
            Ok(expires_at) => expires_at.and_utc() <= Utc::now(),
            Err(err) => {
                tracing::warn!(
                    expires = %self.expires,
                    error = %err,
                    "session expiry string did not parse, treating session as stale"
                );
                true
            }
        }
    }
}

/// Holds the current session, if any. A stale session is never patched in
/// place; the owner fetches a replacement and calls [`SessionManager::install`].
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazy staleness check: absent, expired, and unparsable all demand a
    /// refresh before the next request goes out.
    pub fn needs_refresh(&self) -> bool {
        match &self.current {
            None => true,
            Some(session) => session.is_expired(),
        }
    }

    /// Replace the session wholesale.
    pub fn install(&mut self, session: Session) {
        tracing::debug!(expires = %session.expires, "installing refreshed session");
        self.current = Some(session);
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Bearer token for the `authorization` header, if a session is held.
    pub fn access_token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.access_token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionManager, User};
    use chrono::{Duration, Utc};

    fn session_expiring(expires: &str) -> Session {
        Session {
            user: User::default(),
            expires: expires.to_string(),
            access_token: "token".to_string(),
        }
    }

    fn vendor_timestamp(offset: Duration) -> String {
        (Utc::now() + offset)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
    }

    #[test]
    fn future_expiry_is_fresh() {
        let session = session_expiring(&vendor_timestamp(Duration::hours(1)));
        assert!(!session.is_expired());
    }

    #[test]
    fn past_expiry_is_stale() {
        let session = session_expiring(&vendor_timestamp(Duration::hours(-1)));
        assert!(session.is_expired());
    }

    #[test]
    fn malformed_expiry_is_stale() {
        for bad in ["", "not-a-date", "2023-13-99T99:99:99.000Z", "12345"] {
            assert!(session_expiring(bad).is_expired(), "expected stale: {bad:?}");
        }
    }

    #[test]
    fn expiry_without_fractional_seconds_still_parses() {
        let expires = (Utc::now() + Duration::hours(2))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        assert!(!session_expiring(&expires).is_expired());
    }

    #[test]
    fn manager_starts_stale_and_freshens_on_install() {
        let mut manager = SessionManager::new();
        assert!(manager.needs_refresh());
        assert!(manager.access_token().is_none());

        manager.install(session_expiring(&vendor_timestamp(Duration::hours(1))));
        assert!(!manager.needs_refresh());
        assert_eq!(manager.access_token(), Some("token"));
    }

    #[test]
    fn manager_demands_refresh_once_expired_or_unparsable() {
        let mut manager = SessionManager::new();
        manager.install(session_expiring(&vendor_timestamp(Duration::minutes(-5))));
        assert!(manager.needs_refresh());

        manager.install(session_expiring("garbage"));
        assert!(manager.needs_refresh());
    }

    #[test]
    fn session_decodes_wire_shape() {
        let json = r#"{
            "user": {"id": "u1", "name": "Ada", "email": "ada@example.com",
                     "image": "", "picture": "", "groups": []},
            "expires": "2099-01-01T00:00:00.000Z",
            "accessToken": "eyJ..."
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.access_token, "eyJ...");
        assert!(!session.is_expired());
    }
}
