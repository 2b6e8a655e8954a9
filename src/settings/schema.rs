//! Settings schema definitions.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::models::Role;

/// Root settings structure.
///
/// Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Engine timeouts and channel sizes
    pub resolver: ResolverConfig,

    pub logging: LoggingSettings,

    /// In-memory collaborators used by the demo CLI
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Level used when no filter is set: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Delay applied to every profile store call
    pub store_latency_ms: u64,

    /// Fail every profile store call
    pub store_offline: bool,

    /// Sign-up returns no session until the email is confirmed
    pub require_email_confirmation: bool,

    /// Delay before the provider acknowledges a sign-out
    pub sign_out_delay_ms: u64,

    /// Accounts registered at startup
    #[serde(default)]
    pub accounts: Vec<DemoAccount>,
}

/// A seeded provider account, optionally with a stored profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoAccount {
    pub email: String,

    /// Supports $ENV_VAR syntax
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default)]
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Seed a profile row as well as the account
    #[serde(default = "default_true")]
    pub create_profile: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            version: 1,
            resolver: ResolverConfig::default(),
            logging: LoggingSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: None,
            level: "info".to_string(),
        }
    }
}
