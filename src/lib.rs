//! Resolve "who is the current user, and in what role" for an application
//! backed by a hosted auth provider and a profile store.
//!
//! A claims-derived identity is published as soon as a session appears, then
//! refined in the background from the durable profile. Results that arrive
//! after a newer session event or a logout are discarded.
//!
//! ```rust,ignore
//! let engine = ResolutionEngine::spawn(provider, store, ResolverConfig::default());
//! let snapshot = engine.login("vera@loom.test", "secret").await?;
//! if snapshot.is_vendor() { /* ... */ }
//! ```

pub mod claims;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod models;
pub mod provider;
pub mod settings;
pub mod store;

pub use config::ResolverConfig;
pub use engine::{
    EngineHandle, EngineStatus, IdentityEvent, IdentitySnapshot, ResolutionEngine,
    ResolutionPhase, SignupData, SignupResult,
};
pub use error::{IdentityError, Result};
pub use models::{Identity, IdentitySource, ProfileRecord, Role};
pub use provider::{AuthProvider, Session, SessionEvent, SessionEventKind};
pub use store::{ProfileGateway, ProfileStore};
