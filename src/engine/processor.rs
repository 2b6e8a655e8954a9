//! The resolution engine task.
//!
//! A single task owns the identity, the loading flag and the generation
//! guard. Provider events and commands are applied one at a time; all I/O
//! runs in spawned tasks that route their results back here as commands,
//! where they are checked against the guard before anything is written.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::events::{EngineStatus, IdentityEvent, IdentitySnapshot, ResolutionPhase};
use super::handle::EngineHandle;
use crate::claims;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::guard::{Generation, GenerationGuard};
use crate::models::{IdentitySource, ProfileRecord};
use crate::provider::{AuthProvider, Session, SessionEvent, SessionEventKind};
use crate::store::{ProfileGateway, ProfileStore};

/// Work routed to the engine task.
pub(crate) enum EngineCommand {
    /// Startup session lookup finished
    Hydrated {
        token: Generation,
        result: Result<Option<Session>>,
    },
    /// Explicit login/signup obtained a session; reply with its token
    Begin {
        session: Session,
        reply: oneshot::Sender<Generation>,
    },
    /// Profile read finished
    Enriched {
        token: Generation,
        user_id: String,
        email: String,
        outcome: Result<Option<ProfileRecord>>,
        /// Present for synchronous enrichment; receives whether it was applied
        reply: Option<oneshot::Sender<bool>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    /// Provider sign-out call returned
    SignOutSettled {
        result: Result<()>,
    },
    /// Clear the loading flag without touching the identity
    SettleLoading,
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

pub struct ResolutionEngine {
    provider: Arc<dyn AuthProvider>,
    gateway: ProfileGateway,
    guard: GenerationGuard,
    snapshot_tx: watch::Sender<IdentitySnapshot>,
    event_tx: broadcast::Sender<IdentityEvent>,
    /// Weak so the loop ends once every handle is dropped
    command_tx: mpsc::WeakUnboundedSender<EngineCommand>,
    sign_outs_in_flight: usize,
}

impl ResolutionEngine {
    /// Spawn the engine on the current tokio runtime.
    ///
    /// Subscribes to provider events before the startup session lookup so
    /// nothing emitted in between is missed.
    pub fn spawn(
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn ProfileStore>,
        config: ResolverConfig,
    ) -> EngineHandle {
        let gateway = ProfileGateway::new(store, &config);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(IdentitySnapshot::initial());
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session_events = provider.subscribe();

        let engine = Self {
            provider: provider.clone(),
            gateway: gateway.clone(),
            guard: GenerationGuard::new(),
            snapshot_tx,
            event_tx: event_tx.clone(),
            command_tx: command_tx.downgrade(),
            sign_outs_in_flight: 0,
        };

        tokio::spawn(async move {
            engine.run(command_rx, session_events, shutdown_tx).await;
        });

        EngineHandle::new(
            command_tx,
            snapshot_rx,
            event_tx,
            provider,
            gateway,
            shutdown_rx,
            config.shutdown_timeout(),
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        mut session_events: broadcast::Receiver<SessionEvent>,
        shutdown_complete: oneshot::Sender<()>,
    ) {
        tracing::info!("[engine] Resolution engine started");
        self.hydrate();

        let mut provider_open = true;
        loop {
            // Provider events first: an event pushed before a caller's
            // command was sent is applied before that command.
            tokio::select! {
                biased;
                event = session_events.recv(), if provider_open => match event {
                    Ok(event) => self.handle_session_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "[engine] Missed {} provider events, re-reading current session",
                            skipped
                        );
                        self.hydrate();
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("[engine] Provider event stream closed");
                        provider_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        drop(session_events);
        drop(commands);
        tracing::info!("[engine] Resolution engine stopped");
        let _ = shutdown_complete.send(());
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Hydrated { token, result } => self.handle_hydrated(token, result),
            EngineCommand::Begin { session, reply } => {
                // An explicit sign-in supersedes a pending sign-out; the
                // generation bump alone fences work from before the logout.
                if self.guard.is_logging_out() {
                    tracing::debug!(
                        "[engine] Sign-in for {} lifts the pending logout fence",
                        session.user_id
                    );
                    self.guard.end_logout();
                }
                let token = self.guard.begin_operation();
                tracing::debug!("[engine] Explicit sign-in for {} under {}", session.user_id, token);
                self.publish_claims(&session, token);
                let _ = reply.send(token);
            }
            EngineCommand::Enriched {
                token,
                user_id,
                email,
                outcome,
                reply,
            } => {
                let applied = self.apply_enrichment(token, &user_id, &email, outcome);
                if let Some(reply) = reply {
                    let _ = reply.send(applied);
                }
            }
            EngineCommand::Logout { reply } => {
                self.handle_logout();
                let _ = reply.send(());
            }
            EngineCommand::SignOutSettled { result } => self.handle_sign_out_settled(result),
            EngineCommand::SettleLoading => self.settle_loading(),
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        tracing::debug!(
            "[engine] Provider event {:?} user={:?}",
            event.kind,
            event.session.as_ref().map(|s| s.user_id.as_str())
        );

        match (event.kind, event.session) {
            (SessionEventKind::SessionEnded, _) => self.handle_provider_sign_out(),
            (_, None) => {
                tracing::debug!("[engine] Session event without a session, treating as sign-out");
                self.handle_provider_sign_out();
            }
            (_, Some(session)) => {
                let token = self.guard.begin_operation();
                self.publish_claims(&session, token);
                self.spawn_enrichment(token, &session);

                if event.just_confirmed {
                    self.spawn_ensure_profile(session.user_id.clone(), session.email_or_empty());
                }
            }
        }
    }

    /// Start (or restart) the startup session lookup.
    fn hydrate(&mut self) {
        let token = self.guard.begin_operation();
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.phase != ResolutionPhase::Unresolved {
                return false;
            }
            snapshot.phase = ResolutionPhase::Resolving;
            snapshot.loading = true;
            true
        });

        let Some(tx) = self.command_tx.upgrade() else {
            return;
        };
        let provider = self.provider.clone();
        tokio::spawn(async move {
            let result = provider.current_session().await;
            let _ = tx.send(EngineCommand::Hydrated { token, result });
        });
    }

    fn handle_hydrated(&mut self, token: Generation, result: Result<Option<Session>>) {
        if !self.guard.is_current(token) {
            tracing::debug!("[engine] Discarding startup session from {}, superseded", token);
            return;
        }

        match result {
            Ok(Some(session)) => {
                tracing::info!("[engine] Restored session for {}", session.user_id);
                self.publish_claims(&session, token);
                let enrichment = self.guard.begin_operation();
                self.spawn_enrichment(enrichment, &session);
            }
            Ok(None) => {
                tracing::debug!("[engine] No session at startup");
                self.publish_signed_out(token);
            }
            Err(e) => {
                tracing::warn!("[engine] Failed to read current session: {}", e);
                self.publish_signed_out(token);
            }
        }
    }

    fn handle_provider_sign_out(&mut self) {
        let token = self.guard.begin_logout();
        self.publish_signed_out(token);

        // Without a local sign-out pending nothing will call end_logout;
        // the bumped generation already fences older work.
        if self.sign_outs_in_flight == 0 {
            self.guard.end_logout();
        }
    }

    fn handle_logout(&mut self) {
        tracing::info!("[engine] Logging out");
        let token = self.guard.begin_logout();
        self.publish_signed_out(token);
        self.sign_outs_in_flight += 1;

        let Some(tx) = self.command_tx.upgrade() else {
            return;
        };
        let provider = self.provider.clone();
        tokio::spawn(async move {
            let result = provider.sign_out().await;
            let _ = tx.send(EngineCommand::SignOutSettled { result });
        });
    }

    fn handle_sign_out_settled(&mut self, result: Result<()>) {
        match result {
            Ok(()) => tracing::info!("[engine] Provider sign-out complete"),
            Err(e) => tracing::warn!(
                "[engine] Provider sign-out failed, local state already cleared: {}",
                e
            ),
        }

        self.sign_outs_in_flight = self.sign_outs_in_flight.saturating_sub(1);
        if self.sign_outs_in_flight == 0 {
            self.guard.end_logout();
        }
    }

    /// Apply a profile read. Returns whether the identity was updated.
    fn apply_enrichment(
        &mut self,
        token: Generation,
        user_id: &str,
        email: &str,
        outcome: Result<Option<ProfileRecord>>,
    ) -> bool {
        if !self.guard.is_current(token) {
            tracing::debug!(
                "[engine] Discarding profile result for {} from {} (current {}, logging_out={})",
                user_id,
                token,
                self.guard.current(),
                self.guard.is_logging_out()
            );
            return false;
        }

        let current = self
            .snapshot_tx
            .borrow()
            .identity
            .clone()
            .filter(|identity| identity.id == user_id);
        let Some(current) = current else {
            tracing::debug!("[engine] Profile result for {} no longer matches identity", user_id);
            return false;
        };

        match outcome {
            Ok(Some(record)) => {
                let identity = current.with_profile(&record);
                if identity.role != current.role {
                    tracing::info!(
                        "[engine] Profile role for {} is {} (claims said {})",
                        user_id,
                        identity.role,
                        current.role
                    );
                }
                self.publish(
                    IdentitySnapshot::resolved(identity.clone(), IdentitySource::Profile),
                    IdentityEvent::Resolved {
                        identity,
                        source: IdentitySource::Profile,
                        generation: token.value(),
                    },
                );
                true
            }
            Ok(None) => {
                tracing::info!("[engine] No profile for {}, scheduling creation", user_id);
                self.spawn_ensure_profile(user_id.to_string(), email.to_string());
                false
            }
            Err(e) => {
                tracing::warn!(
                    "[engine] Profile lookup for {} failed, keeping claims identity: {}",
                    user_id,
                    e
                );
                false
            }
        }
    }

    fn spawn_enrichment(&self, token: Generation, session: &Session) {
        let Some(tx) = self.command_tx.upgrade() else {
            return;
        };
        let gateway = self.gateway.clone();
        let user_id = session.user_id.clone();
        let email = session.email_or_empty();

        tokio::spawn(async move {
            let outcome = gateway.read_profile(&user_id).await;
            let _ = tx.send(EngineCommand::Enriched {
                token,
                user_id,
                email,
                outcome,
                reply: None,
            });
        });
    }

    fn spawn_ensure_profile(&self, user_id: String, email: String) {
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            gateway.ensure_profile_exists(&user_id, &email).await;
        });
    }

    fn publish_claims(&mut self, session: &Session, token: Generation) {
        let claims_identity = claims::extract(session);

        // A profile-derived identity for the same user is never downgraded
        // to its claims placeholder.
        let retained = {
            let snapshot = self.snapshot_tx.borrow();
            match (&snapshot.identity, snapshot.source) {
                (Some(existing), Some(IdentitySource::Profile))
                    if existing.id == claims_identity.id =>
                {
                    Some(existing.clone())
                }
                _ => None,
            }
        };

        let (identity, source) = match retained {
            Some(existing) => (existing, IdentitySource::Profile),
            None => (claims_identity, IdentitySource::Claims),
        };

        self.publish(
            IdentitySnapshot::resolved(identity.clone(), source),
            IdentityEvent::Resolved {
                identity,
                source,
                generation: token.value(),
            },
        );
    }

    fn publish_signed_out(&mut self, token: Generation) {
        self.publish(
            IdentitySnapshot::signed_out(),
            IdentityEvent::SignedOut {
                generation: token.value(),
            },
        );
    }

    fn settle_loading(&mut self) {
        let changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if !snapshot.loading {
                return false;
            }
            snapshot.loading = false;
            if snapshot.phase == ResolutionPhase::Resolving {
                snapshot.phase = ResolutionPhase::Unresolved;
            }
            true
        });

        if changed {
            tracing::debug!("[engine] Loading settled");
            let _ = self.event_tx.send(IdentityEvent::LoadingSettled);
        }
    }

    fn publish(&mut self, snapshot: IdentitySnapshot, event: IdentityEvent) {
        tracing::debug!(
            "[engine] Publishing phase={:?} user={:?} source={:?}",
            snapshot.phase,
            snapshot.identity.as_ref().map(|i| i.id.as_str()),
            snapshot.source
        );
        self.snapshot_tx.send_replace(snapshot);
        // No event subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn status(&self) -> EngineStatus {
        let snapshot = self.snapshot_tx.borrow();
        EngineStatus {
            generation: self.guard.current().value(),
            logging_out: self.guard.is_logging_out(),
            sign_outs_in_flight: self.sign_outs_in_flight,
            phase: snapshot.phase,
            authenticated: snapshot.is_authenticated(),
        }
    }
}
