//! Auth provider contract.
//!
//! The provider owns sessions and tokens. The resolver only reads sessions,
//! listens for session-changed events and delegates credential operations.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::Role;

pub use memory::MemoryAuthProvider;

/// Claims the provider attaches to a session (user metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Provider-issued session. Opaque apart from the attributes read here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub claims: SessionClaims,
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            claims: SessionClaims::default(),
            access_token: String::new(),
        }
    }

    pub fn with_claims(mut self, claims: SessionClaims) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    /// Email for profile bookkeeping; empty when the provider has none.
    pub fn email_or_empty(&self) -> String {
        self.email.clone().unwrap_or_default()
    }
}

// Keeps tokens out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("claims", &self.claims)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    SessionStarted,
    SessionRefreshed,
    SessionEnded,
}

/// Session-changed notification pushed by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
    /// First sign-in, or refresh, right after the account was confirmed.
    #[serde(default)]
    pub just_confirmed: bool,
}

impl SessionEvent {
    pub fn started(session: Session, just_confirmed: bool) -> Self {
        Self {
            kind: SessionEventKind::SessionStarted,
            session: Some(session),
            just_confirmed,
        }
    }

    pub fn refreshed(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SessionRefreshed,
            session: Some(session),
            just_confirmed: false,
        }
    }

    pub fn ended() -> Self {
        Self {
            kind: SessionEventKind::SessionEnded,
            session: None,
            just_confirmed: false,
        }
    }
}

/// Metadata attached to a new account at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl SignupMetadata {
    /// Claims a session for this account will carry.
    pub fn to_claims(&self) -> SessionClaims {
        SessionClaims {
            full_name: self.full_name.clone(),
            role: Some(self.role.as_str().to_string()),
            company_name: self.company_name.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Result of a provider sign-up.
#[derive(Debug, Clone, Default)]
pub struct SignUpOutcome {
    /// Set when the provider created the user.
    pub user_id: Option<String>,
    /// Set when no email confirmation is pending.
    pub session: Option<Session>,
}

/// Where the caller should send the user to finish an OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthRedirect {
    pub provider: String,
    pub url: String,
}

/// External authentication provider.
///
/// # Object Safety
/// Used as `Arc<dyn AuthProvider>`.
///
/// # Ownership
/// Takes owned `String`s to keep the boxed `#[async_trait]` futures `'static`-friendly.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// The session the provider currently holds, if any.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Subscribe to session-changed events. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Fails with `IdentityError::AuthRejected` on bad credentials.
    async fn sign_in_with_password(&self, email: String, password: String) -> Result<Session>;

    async fn sign_up(
        &self,
        email: String,
        password: String,
        metadata: SignupMetadata,
    ) -> Result<SignUpOutcome>;

    /// Start an OAuth flow; the session arrives later as a `SessionStarted` event.
    async fn sign_in_with_oauth(&self, provider: String) -> Result<OAuthRedirect>;

    /// Fails with `IdentityError::Provider`.
    async fn sign_out(&self) -> Result<()>;
}
