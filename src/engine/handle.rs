//! Consumer-facing handle to a running resolution engine.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex as TokioMutex};

use super::events::{EngineStatus, IdentityEvent, IdentitySnapshot};
use super::processor::EngineCommand;
use crate::error::{IdentityError, Result};
use crate::guard::Generation;
use crate::models::{default_display_name, non_empty, Identity, ProfileRecord, Role};
use crate::provider::{AuthProvider, OAuthRedirect, Session, SignupMetadata};
use crate::store::ProfileGateway;

/// Optional profile details supplied at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl SignupData {
    fn to_metadata(&self) -> SignupMetadata {
        SignupMetadata {
            full_name: self.name.clone(),
            role: self.role.unwrap_or_default(),
            company_name: self.company_name.clone(),
            phone: self.phone.clone(),
        }
    }

    fn to_profile(&self, user_id: &str, email: &str) -> ProfileRecord {
        ProfileRecord {
            id: user_id.to_string(),
            email: email.to_string(),
            full_name: non_empty(self.name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| default_display_name(email)),
            role: self.role.unwrap_or_default(),
            company_name: non_empty(self.company_name.as_deref()).map(str::to_string),
            phone: non_empty(self.phone.as_deref()).map(str::to_string),
            created_at: chrono::Utc::now(),
        }
    }
}

/// What a sign-up produced.
#[derive(Debug, Clone)]
pub struct SignupResult {
    pub user_id: Option<String>,
    /// The provider is waiting for email confirmation; no session yet
    pub confirmation_pending: bool,
    pub snapshot: IdentitySnapshot,
}

/// Cloneable handle: the read contract plus login, signup and logout.
///
/// The engine task stops when `shutdown` is called or every handle is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    snapshot_rx: watch::Receiver<IdentitySnapshot>,
    event_tx: broadcast::Sender<IdentityEvent>,
    provider: Arc<dyn AuthProvider>,
    gateway: ProfileGateway,
    shutdown_rx: Arc<TokioMutex<Option<oneshot::Receiver<()>>>>,
    shutdown_timeout: Duration,
}

impl EngineHandle {
    pub(crate) fn new(
        command_tx: mpsc::UnboundedSender<EngineCommand>,
        snapshot_rx: watch::Receiver<IdentitySnapshot>,
        event_tx: broadcast::Sender<IdentityEvent>,
        provider: Arc<dyn AuthProvider>,
        gateway: ProfileGateway,
        shutdown_rx: oneshot::Receiver<()>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            command_tx,
            snapshot_rx,
            event_tx,
            provider,
            gateway,
            shutdown_rx: Arc::new(TokioMutex::new(Some(shutdown_rx))),
            shutdown_timeout,
        }
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot_rx.borrow().identity.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot_rx.borrow().loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot_rx.borrow().is_authenticated()
    }

    /// Reactive view of the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<IdentitySnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stream of publish notifications from now on.
    pub fn events(&self) -> broadcast::Receiver<IdentityEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status { reply })?;
        rx.await.map_err(|_| IdentityError::EngineStopped)
    }

    /// Sign in with a password. On success the profile is ensured and read
    /// before returning, so the returned snapshot is profile-accurate when
    /// the store answers in time.
    ///
    /// Fails with `AuthRejected` on bad credentials; state is untouched then.
    pub async fn login(&self, email: &str, password: &str) -> Result<IdentitySnapshot> {
        self.ensure_running()?;
        let email = email.trim();

        let session = self
            .provider
            .sign_in_with_password(email.to_string(), password.to_string())
            .await
            .inspect_err(|e| tracing::warn!("[engine] Login failed for {}: {}", email, e))?;
        tracing::info!("[engine] Signed in {} ({})", email, session.user_id);

        let token = self.begin(session.clone()).await?;
        let profile_email = session.email.clone().unwrap_or_else(|| email.to_string());
        self.gateway
            .ensure_profile_exists(&session.user_id, &profile_email)
            .await;
        self.enrich_now(token, &session.user_id, &profile_email).await?;

        Ok(self.snapshot())
    }

    /// Create an account. The role defaults to buyer. A profile is created
    /// eagerly (failure is logged only). With an active session the identity
    /// is enriched before returning; otherwise loading is settled and the
    /// identity arrives with a later session event.
    pub async fn signup(&self, email: &str, password: &str, data: SignupData) -> Result<SignupResult> {
        self.ensure_running()?;
        let email = email.trim();

        let outcome = self
            .provider
            .sign_up(email.to_string(), password.to_string(), data.to_metadata())
            .await
            .inspect_err(|e| tracing::warn!("[engine] Signup failed for {}: {}", email, e))?;

        let Some(user_id) = outcome.user_id.clone() else {
            tracing::info!("[engine] Signup for {} created no user", email);
            self.send(EngineCommand::SettleLoading)?;
            return Ok(SignupResult {
                user_id: None,
                confirmation_pending: false,
                snapshot: self.snapshot(),
            });
        };

        // Fence the provider's own session event before writing the profile,
        // so its background enrichment cannot race the eager insert.
        let active = match outcome.session {
            Some(session) => Some((self.begin(session.clone()).await?, session)),
            None => None,
        };

        if let Err(e) = self
            .gateway
            .create_profile_if_absent(data.to_profile(&user_id, email))
            .await
        {
            tracing::warn!(
                "[engine] Profile creation during signup failed (may be created later): {}",
                e
            );
        }

        match active {
            Some((token, session)) => {
                let profile_email = session.email.clone().unwrap_or_else(|| email.to_string());
                self.enrich_now(token, &session.user_id, &profile_email).await?;
                Ok(SignupResult {
                    user_id: Some(user_id),
                    confirmation_pending: false,
                    snapshot: self.snapshot(),
                })
            }
            None => {
                tracing::info!("[engine] Signup for {} awaiting email confirmation", email);
                // Settle via a round trip so the returned snapshot reflects it
                self.send(EngineCommand::SettleLoading)?;
                self.status().await?;
                Ok(SignupResult {
                    user_id: Some(user_id),
                    confirmation_pending: true,
                    snapshot: self.snapshot(),
                })
            }
        }
    }

    /// Sign out. Clears the identity before returning and does not wait for
    /// the provider call. Never fails.
    pub async fn logout(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(EngineCommand::Logout { reply }).is_err() {
            tracing::debug!("[engine] Logout requested after engine stopped");
            return;
        }
        let _ = rx.await;
    }

    /// Start an OAuth sign-in. The session arrives later as a provider event.
    pub async fn begin_oauth(&self, provider: &str) -> Result<OAuthRedirect> {
        self.ensure_running()?;
        self.provider.sign_in_with_oauth(provider.to_string()).await
    }

    /// Stop the engine and wait (bounded) for its task to exit.
    pub async fn shutdown(&self) {
        tracing::info!("[engine] Shutting down");
        let _ = self.command_tx.send(EngineCommand::Shutdown);

        if let Some(rx) = self.shutdown_rx.lock().await.take() {
            match tokio::time::timeout(self.shutdown_timeout, rx).await {
                Ok(Ok(())) => tracing::info!("[engine] Shutdown complete"),
                Ok(Err(_)) => tracing::warn!("[engine] Shutdown signal dropped"),
                Err(_) => tracing::warn!(
                    "[engine] Shutdown timed out after {}ms",
                    self.shutdown_timeout.as_millis()
                ),
            }
        }
    }

    async fn begin(&self, session: Session) -> Result<Generation> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Begin { session, reply })?;
        rx.await.map_err(|_| IdentityError::EngineStopped)
    }

    /// Read the profile in the caller's task and apply it through the engine.
    async fn enrich_now(&self, token: Generation, user_id: &str, email: &str) -> Result<bool> {
        let outcome = self.gateway.read_profile(user_id).await;
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Enriched {
            token,
            user_id: user_id.to_string(),
            email: email.to_string(),
            outcome,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| IdentityError::EngineStopped)
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| IdentityError::EngineStopped)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.command_tx.is_closed() {
            return Err(IdentityError::EngineStopped);
        }
        Ok(())
    }
}
