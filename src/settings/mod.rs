//! TOML settings for the resolver and its demo collaborators.
//!
//! Settings are loaded from `~/.identity-resolver/settings.toml` with
//! environment variable interpolation support.
//!
//! # Usage
//!
//! ```rust,ignore
//! use identity_resolver::settings::{get_with_env_fallback, SettingsManager};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let filter = get_with_env_fallback(&settings.logging.filter, &["RUST_LOG"], None);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::{DemoAccount, DemoSettings, LoggingSettings, ResolverSettings};
