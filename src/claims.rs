//! Claims extraction: a minimal identity from the session alone.

use crate::models::{default_display_name, non_empty, Identity, Role};
use crate::provider::Session;

/// Build a claims-derived identity. Pure and total.
///
/// - name: `full_name` claim, else the email's local part, else `"User"`
/// - email: empty when the session has none
/// - role: `role` claim, else `Buyer`
pub fn extract(session: &Session) -> Identity {
    let email = session
        .email
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let name = match non_empty(session.claims.full_name.as_deref()) {
        Some(name) => name.to_string(),
        None => default_display_name(&email),
    };

    let role = session
        .claims
        .role
        .as_deref()
        .map(Role::parse_lenient)
        .unwrap_or_default();

    Identity {
        id: session.user_id.clone(),
        email,
        name,
        role,
        company_name: None,
        phone: None,
    }
}
