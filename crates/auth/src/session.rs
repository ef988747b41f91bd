//! Session model: who is signed in, with which tokens, until when.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tillwise_core::RecordId;

use crate::claims::{Claims, decode_claims};
use crate::permissions::PermissionSet;
use crate::resolver::has_permission;

/// Version of the persisted session layout. Stored sessions with any other
/// version are treated as absent.
pub const SESSION_SCHEMA_VERSION: u32 = 2;

/// Lower bound for the proactive refresh timer.
pub const MIN_REFRESH_DELAY: StdDuration = StdDuration::from_secs(5);

/// Token set issued by `/auth/login` and `/auth/refresh`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl core::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: RecordId,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SessionUser {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.username)
    }
}

/// A live session.
///
/// Sessions are immutable values: refreshes and permission reloads produce a
/// new `Session` that replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub schema_version: u32,
    pub user: SessionUser,
    pub permissions: PermissionSet,
    pub tokens: TokenSet,
    pub access_token_expires_at: DateTime<Utc>,
    #[serde(default)]
    pub claims: Option<Claims>,
}

impl Session {
    /// Build a session from freshly issued tokens.
    ///
    /// `access_token_expires_at` is always `issued_at + tokens.expires_in`.
    pub fn new(user: SessionUser, permissions: PermissionSet, tokens: TokenSet, issued_at: DateTime<Utc>) -> Self {
        let access_token_expires_at = expiry_of(&tokens, issued_at);
        let claims = decode_claims(&tokens.access_token).ok();
        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            user,
            permissions,
            tokens,
            access_token_expires_at,
            claims,
        }
    }

    /// New session carrying refreshed tokens.
    ///
    /// A refresh response without a refresh token keeps the current one.
    pub fn with_tokens(&self, mut tokens: TokenSet, issued_at: DateTime<Utc>) -> Self {
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = self.tokens.refresh_token.clone();
        }
        Self::new(self.user.clone(), self.permissions.clone(), tokens, issued_at)
    }

    pub fn with_permissions(&self, permissions: PermissionSet) -> Self {
        Self {
            permissions,
            ..self.clone()
        }
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.refresh_token.as_deref()
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_token_expires_at
    }

    pub fn is_current_schema(&self) -> bool {
        self.schema_version == SESSION_SCHEMA_VERSION
    }

    pub fn has_permission<'a, I>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        has_permission(&self.permissions, codes)
    }
}

fn expiry_of(tokens: &TokenSet, issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::seconds(tokens.expires_in.max(0))
}

/// Delay before a proactive refresh: `max(5s, expires_at - now - margin)`.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: StdDuration) -> StdDuration {
    let margin = Duration::from_std(margin).unwrap_or(Duration::zero());
    let remaining = (expires_at - now - margin).to_std().unwrap_or(StdDuration::ZERO);
    remaining.max(MIN_REFRESH_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> SessionUser {
        SessionUser {
            id: RecordId::new(7),
            username: "alice".into(),
            full_name: Some("Alice Doe".into()),
            email: None,
            role: Some("manager".into()),
            is_active: true,
        }
    }

    fn tokens(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenSet {
        TokenSet {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            token_type: "bearer".into(),
            expires_in,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn expiry_is_derived_from_tokens() {
        let s = Session::new(user(), PermissionSet::new(), tokens("a", Some("r"), 900), at(1_000));
        assert_eq!(s.access_token_expires_at, at(1_900));
        assert!(s.is_authenticated_at(at(1_899)));
        assert!(!s.is_authenticated_at(at(1_900)));
        assert!(s.is_current_schema());
    }

    #[test]
    fn refreshed_session_keeps_refresh_token_when_omitted() {
        let s = Session::new(user(), PermissionSet::new(), tokens("a1", Some("r1"), 900), at(0));
        let next = s.with_tokens(tokens("a2", None, 600), at(500));
        assert_eq!(next.access_token(), "a2");
        assert_eq!(next.refresh_token(), Some("r1"));
        assert_eq!(next.access_token_expires_at, at(1_100));
        // The original value is untouched.
        assert_eq!(s.access_token(), "a1");
    }

    #[test]
    fn permission_checks_use_held_set() {
        let held: PermissionSet = ["sales:view"].into_iter().collect();
        let s = Session::new(user(), held, tokens("a", None, 60), at(0));
        assert!(s.has_permission(["sales:view"]));
        assert!(!s.has_permission(["sales:view", "sales:refund"]));

        let admin = s.with_permissions(["all"].into_iter().collect());
        assert!(admin.has_permission(["sales:refund", "users:delete"]));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", tokens("secret-access", Some("secret-refresh"), 60));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut u = user();
        assert_eq!(u.display_name(), "Alice Doe");
        u.full_name = None;
        assert_eq!(u.display_name(), "alice");
    }

    #[test]
    fn refresh_delay_respects_margin_and_floor() {
        let margin = StdDuration::from_secs(60);
        assert_eq!(refresh_delay(at(1_000), at(0), margin), StdDuration::from_secs(940));
        assert_eq!(refresh_delay(at(30), at(0), margin), MIN_REFRESH_DELAY);
        assert_eq!(refresh_delay(at(0), at(100), margin), MIN_REFRESH_DELAY);
    }

    #[test]
    fn persisted_layout_round_trips() {
        let s = Session::new(user(), ["all"].into_iter().collect(), tokens("a", Some("r"), 60), at(0));
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
