//! Identity resolution engine.
//!
//! ## Architecture
//!
//! ```text
//! provider events ──┐
//!                   ├──> ResolutionEngine task ──> watch<IdentitySnapshot>
//! handle commands ──┘        │     ▲                broadcast<IdentityEvent>
//!                            │     │
//!                     spawn  ▼     │ results (fenced by generation)
//!                   profile reads / sign-out / ensure-profile
//! ```
//!
//! ### Claims first
//! Every session event publishes a claims-derived identity immediately.
//!
//! ### Enrichment
//! A background profile read may then republish a profile-derived identity,
//! but only if its generation is still current and no logout is in progress.
//!
//! ### Logout
//! Clears the identity synchronously and fires the provider sign-out
//! without waiting for it.

pub mod events;
pub mod handle;
pub mod processor;


pub use events::{EngineStatus, IdentityEvent, IdentitySnapshot, ResolutionPhase};
pub use handle::{EngineHandle, SignupData, SignupResult};
pub use processor::ResolutionEngine;
