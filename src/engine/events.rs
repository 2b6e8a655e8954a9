//! Consumer-facing state and change notifications.

use serde::{Deserialize, Serialize};

use crate::models::{Identity, IdentitySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    /// Nothing resolved yet
    Unresolved,
    /// Startup hydration in progress
    Resolving,
    /// An identity is published
    Resolved,
    /// No session
    SignedOut,
}

/// The reactive value consumers read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub identity: Option<Identity>,
    pub loading: bool,
    pub phase: ResolutionPhase,
    pub source: Option<IdentitySource>,
}

impl IdentitySnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            identity: None,
            loading: true,
            phase: ResolutionPhase::Unresolved,
            source: None,
        }
    }

    pub(crate) fn resolved(identity: Identity, source: IdentitySource) -> Self {
        Self {
            identity: Some(identity),
            loading: false,
            phase: ResolutionPhase::Resolved,
            source: Some(source),
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            identity: None,
            loading: false,
            phase: ResolutionPhase::SignedOut,
            source: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn is_vendor(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_vendor)
    }

    pub fn is_buyer(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_buyer)
    }
}

impl Default for IdentitySnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

/// Emitted each time the engine publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    /// A new identity value was published
    Resolved {
        identity: Identity,
        source: IdentitySource,
        generation: u64,
    },

    /// The identity was cleared
    SignedOut { generation: u64 },

    /// Loading finished without an identity change
    LoadingSettled,
}

/// Diagnostic view of the engine internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub generation: u64,
    pub logging_out: bool,
    pub sign_outs_in_flight: usize,
    pub phase: ResolutionPhase,
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn identity(role: Role) -> Identity {
        Identity {
            id: "u1".into(),
            email: "sam@x.com".into(),
            name: "sam".into(),
            role,
            company_name: None,
            phone: None,
        }
    }

    #[test]
    fn test_initial_snapshot_is_loading() {
        let snapshot = IdentitySnapshot::initial();
        assert!(snapshot.loading);
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.phase, ResolutionPhase::Unresolved);
    }

    #[test]
    fn test_role_flags() {
        let vendor = IdentitySnapshot::resolved(identity(Role::Vendor), IdentitySource::Profile);
        assert!(vendor.is_vendor());
        assert!(!vendor.is_buyer());

        let signed_out = IdentitySnapshot::signed_out();
        assert!(!signed_out.is_vendor());
        assert!(!signed_out.is_buyer());
    }

    #[test]
    fn test_event_serialization() {
        let event = IdentityEvent::SignedOut { generation: 4 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "signed_out");
        assert_eq!(json["generation"], 4);

        let event = IdentityEvent::Resolved {
            identity: identity(Role::Buyer),
            source: IdentitySource::Claims,
            generation: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resolved");
        assert_eq!(json["source"], "claims");
        assert_eq!(json["identity"]["role"], "buyer");
    }
}
