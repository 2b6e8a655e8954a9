//! In-process auth provider used by the demo CLI and tests.
//!
//! Keeps accounts and the current session in memory and pushes session
//! events to subscribers the same way a hosted provider would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    AuthProvider, OAuthRedirect, Session, SessionClaims, SessionEvent, SignUpOutcome,
    SignupMetadata,
};
use crate::error::{IdentityError, Result};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    email: String,
    password: String,
    claims: SessionClaims,
    confirmed: bool,
    signed_in_before: bool,
}

pub struct MemoryAuthProvider {
    /// Accounts keyed by lowercased email
    accounts: Mutex<HashMap<String, Account>>,

    current: Mutex<Option<Session>>,

    events: broadcast::Sender<SessionEvent>,

    /// Sign-up leaves the account unconfirmed and returns no session
    require_confirmation: AtomicBool,

    sign_out_delay: Mutex<Duration>,

    fail_sign_out: AtomicBool,

    fail_current_session: AtomicBool,

    current_session_calls: AtomicUsize,

    sign_outs_started: AtomicUsize,

    sign_outs_completed: AtomicUsize,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            require_confirmation: AtomicBool::new(false),
            sign_out_delay: Mutex::new(Duration::ZERO),
            fail_sign_out: AtomicBool::new(false),
            fail_current_session: AtomicBool::new(false),
            current_session_calls: AtomicUsize::new(0),
            sign_outs_started: AtomicUsize::new(0),
            sign_outs_completed: AtomicUsize::new(0),
        }
    }

    /// Require email confirmation before sign-up yields a session.
    pub fn with_email_confirmation(self, required: bool) -> Self {
        self.require_confirmation.store(required, Ordering::SeqCst);
        self
    }

    /// Register a confirmed account. Returns its user id.
    pub fn add_account(&self, email: &str, password: &str, claims: SessionClaims) -> String {
        let user_id = Uuid::new_v4().to_string();
        self.insert_account(Account {
            user_id: user_id.clone(),
            email: email.trim().to_string(),
            password: password.to_string(),
            claims,
            confirmed: true,
            signed_in_before: false,
        });
        user_id
    }

    /// Register a confirmed account under a fixed user id.
    pub fn add_account_with_id(
        &self,
        user_id: &str,
        email: &str,
        password: &str,
        claims: SessionClaims,
    ) {
        self.insert_account(Account {
            user_id: user_id.to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
            claims,
            confirmed: true,
            signed_in_before: false,
        });
    }

    fn insert_account(&self, account: Account) {
        self.accounts
            .lock()
            .insert(account.email.to_lowercase(), account);
    }

    /// Replace the current session without emitting an event (startup state).
    pub fn set_current_session(&self, session: Option<Session>) {
        *self.current.lock() = session;
    }

    /// Install a session and announce it, as after an external sign-in.
    pub fn start_session(&self, session: Session, just_confirmed: bool) {
        *self.current.lock() = Some(session.clone());
        self.emit(SessionEvent::started(session, just_confirmed));
    }

    /// Confirm a pending account and sign it in.
    pub fn confirm_email(&self, email: &str) -> Result<Session> {
        let session = {
            let mut accounts = self.accounts.lock();
            let account = accounts
                .get_mut(&email.trim().to_lowercase())
                .ok_or_else(|| IdentityError::AuthRejected(format!("unknown account {}", email)))?;
            account.confirmed = true;
            account.signed_in_before = true;
            session_for(account)
        };

        tracing::info!("[memory-auth] Confirmed {} ({})", email, session.user_id);
        self.start_session(session.clone(), true);
        Ok(session)
    }

    /// Rotate the current session's token and announce the refresh.
    pub fn refresh_session(&self) -> Option<Session> {
        let refreshed = {
            let mut current = self.current.lock();
            let session = current.as_mut()?;
            session.access_token = Uuid::new_v4().to_string();
            session.clone()
        };
        self.emit(SessionEvent::refreshed(refreshed.clone()));
        Some(refreshed)
    }

    /// Drop the current session, as when the provider revokes it.
    pub fn expire_session(&self) {
        *self.current.lock() = None;
        self.emit(SessionEvent::ended());
    }

    pub fn set_sign_out_delay(&self, delay: Duration) {
        *self.sign_out_delay.lock() = delay;
    }

    pub fn set_sign_out_failure(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Make `current_session` fail with a provider error.
    pub fn fail_current_session(&self, fail: bool) {
        self.fail_current_session.store(fail, Ordering::SeqCst);
    }

    /// Number of `current_session` lookups, failed ones included.
    pub fn current_session_calls(&self) -> usize {
        self.current_session_calls.load(Ordering::SeqCst)
    }

    pub fn sign_outs_started(&self) -> usize {
        self.sign_outs_started.load(Ordering::SeqCst)
    }

    pub fn sign_outs_completed(&self) -> usize {
        self.sign_outs_completed.load(Ordering::SeqCst)
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.accounts
            .lock()
            .contains_key(&email.trim().to_lowercase())
    }

    /// Push an arbitrary event to subscribers without touching the session.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!("[memory-auth] Emitting {:?}", event.kind);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn session_for(account: &Account) -> Session {
    Session::new(account.user_id.clone(), Some(account.email.clone()))
        .with_claims(account.claims.clone())
        .with_access_token(Uuid::new_v4().to_string())
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn current_session(&self) -> Result<Option<Session>> {
        self.current_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_current_session.load(Ordering::SeqCst) {
            return Err(IdentityError::Provider("session lookup failed".into()));
        }
        Ok(self.current.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, email: String, password: String) -> Result<Session> {
        let (session, first_sign_in) = {
            let mut accounts = self.accounts.lock();
            let account = accounts
                .get_mut(&email.trim().to_lowercase())
                .filter(|account| account.password == password)
                .ok_or_else(|| IdentityError::AuthRejected("Invalid login credentials".into()))?;

            if !account.confirmed {
                return Err(IdentityError::AuthRejected("Email not confirmed".into()));
            }

            let first_sign_in = !account.signed_in_before;
            account.signed_in_before = true;
            (session_for(account), first_sign_in)
        };

        self.start_session(session.clone(), first_sign_in);
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: String,
        password: String,
        metadata: SignupMetadata,
    ) -> Result<SignUpOutcome> {
        let email = email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(IdentityError::AuthRejected(format!(
                "Invalid email address: {:?}",
                email
            )));
        }

        let confirmation_required = self.require_confirmation.load(Ordering::SeqCst);
        let account = {
            let mut accounts = self.accounts.lock();
            let key = email.to_lowercase();
            if accounts.contains_key(&key) {
                return Err(IdentityError::AuthRejected("User already registered".into()));
            }

            let account = Account {
                user_id: Uuid::new_v4().to_string(),
                email: email.clone(),
                password,
                claims: metadata.to_claims(),
                confirmed: !confirmation_required,
                signed_in_before: !confirmation_required,
            };
            accounts.insert(key, account.clone());
            account
        };

        tracing::info!(
            "[memory-auth] Signed up {} ({}), confirmation_required={}",
            email,
            account.user_id,
            confirmation_required
        );

        if confirmation_required {
            return Ok(SignUpOutcome {
                user_id: Some(account.user_id),
                session: None,
            });
        }

        // The caller creates the profile itself right after sign-up
        let session = session_for(&account);
        self.start_session(session.clone(), false);
        Ok(SignUpOutcome {
            user_id: Some(account.user_id),
            session: Some(session),
        })
    }

    async fn sign_in_with_oauth(&self, provider: String) -> Result<OAuthRedirect> {
        let provider = provider.trim().to_lowercase();
        if provider.is_empty() {
            return Err(IdentityError::Provider("OAuth provider name is empty".into()));
        }
        Ok(OAuthRedirect {
            url: format!("memory://oauth/{}?redirect_to=/", provider),
            provider,
        })
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_outs_started.fetch_add(1, Ordering::SeqCst);

        let delay = *self.sign_out_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.sign_outs_completed.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(IdentityError::Provider("sign-out request failed".into()));
        }

        *self.current.lock() = None;
        self.emit(SessionEvent::ended());
        Ok(())
    }
}
