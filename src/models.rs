//! Identity and profile data types shared across the resolver.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace role carried by an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Vendor,
    #[default]
    Buyer,
}

impl Role {
    /// Parse a role claim, treating anything unrecognised as `Buyer`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "vendor" => Role::Vendor,
            _ => Role::Buyer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Vendor => "vendor",
            Role::Buyer => "buyer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the currently published identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Built from the provider session alone, no store round-trip.
    Claims,
    /// Enriched from the durable profile record.
    Profile,
}

/// The resolved, consumer-visible user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Identity {
    pub fn is_vendor(&self) -> bool {
        self.role == Role::Vendor
    }

    pub fn is_buyer(&self) -> bool {
        self.role == Role::Buyer
    }

    /// Overlay a profile record on this identity. Profile fields win; the
    /// identity only fills in what the record leaves empty.
    pub fn with_profile(&self, record: &ProfileRecord) -> Identity {
        let email = non_empty(Some(&record.email))
            .unwrap_or(&self.email)
            .to_string();
        let name = match non_empty(Some(&record.full_name)) {
            Some(name) => name.to_string(),
            None => default_display_name(&email),
        };

        Identity {
            id: self.id.clone(),
            email,
            name,
            role: record.role,
            company_name: non_empty(record.company_name.as_deref()).map(str::to_string),
            phone: non_empty(record.phone.as_deref()).map(str::to_string),
        }
    }
}

/// Durable profile row, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// Minimal record used when repairing a missing profile.
    pub fn placeholder(id: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: id.into(),
            full_name: default_display_name(&email),
            email,
            role: Role::Buyer,
            company_name: None,
            phone: None,
            created_at: Utc::now(),
        }
    }
}

/// Part of an email address before the `@` (the whole string if there is none).
pub fn local_part_of(email: &str) -> &str {
    email
        .split_once('@')
        .map(|(local, _)| local)
        .unwrap_or(email)
}

/// Display name derived from an email: its local part, or `"User"`.
pub fn default_display_name(email: &str) -> String {
    let local = local_part_of(email.trim()).trim();
    if local.is_empty() {
        "User".to_string()
    } else {
        local.to_string()
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_identity() -> Identity {
        Identity {
            id: "u1".into(),
            email: "sam@x.com".into(),
            name: "sam".into(),
            role: Role::Buyer,
            company_name: None,
            phone: None,
        }
    }

    #[test]
    fn test_role_parse_lenient() {
        assert_eq!(Role::parse_lenient("vendor"), Role::Vendor);
        assert_eq!(Role::parse_lenient(" Vendor "), Role::Vendor);
        assert_eq!(Role::parse_lenient("buyer"), Role::Buyer);
        assert_eq!(Role::parse_lenient("admin"), Role::Buyer);
        assert_eq!(Role::parse_lenient(""), Role::Buyer);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Vendor).unwrap(), "\"vendor\"");
        let role: Role = serde_json::from_str("\"buyer\"").unwrap();
        assert_eq!(role, Role::Buyer);
    }

    #[test]
    fn test_local_part_of() {
        assert_eq!(local_part_of("sam@x.com"), "sam");
        assert_eq!(local_part_of("no-at-sign"), "no-at-sign");
        assert_eq!(local_part_of(""), "");
        assert_eq!(local_part_of("@x.com"), "");
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(default_display_name("sam@x.com"), "sam");
        assert_eq!(default_display_name(""), "User");
        assert_eq!(default_display_name("@x.com"), "User");
    }

    #[test]
    fn test_profile_overrides_claims() {
        let record = ProfileRecord {
            id: "u1".into(),
            email: "sam@x.com".into(),
            full_name: "Sam Actual".into(),
            role: Role::Vendor,
            company_name: Some("Loom & Co".into()),
            phone: Some("555-0100".into()),
            created_at: Utc::now(),
        };

        let merged = claims_identity().with_profile(&record);
        assert_eq!(merged.name, "Sam Actual");
        assert_eq!(merged.role, Role::Vendor);
        assert_eq!(merged.company_name.as_deref(), Some("Loom & Co"));
        assert_eq!(merged.phone.as_deref(), Some("555-0100"));
        assert!(merged.is_vendor());
    }

    #[test]
    fn test_profile_blanks_fall_back() {
        let record = ProfileRecord {
            id: "u1".into(),
            email: "".into(),
            full_name: "  ".into(),
            role: Role::Buyer,
            company_name: Some("".into()),
            phone: None,
            created_at: Utc::now(),
        };

        let merged = claims_identity().with_profile(&record);
        assert_eq!(merged.email, "sam@x.com");
        assert_eq!(merged.name, "sam");
        assert!(merged.company_name.is_none());
    }

    #[test]
    fn test_placeholder_record() {
        let record = ProfileRecord::placeholder("u1", "sam@x.com");
        assert_eq!(record.full_name, "sam");
        assert_eq!(record.role, Role::Buyer);
        assert!(record.company_name.is_none());
    }
}
