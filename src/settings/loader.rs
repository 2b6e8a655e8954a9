//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.identity-resolver/settings.toml`
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::ResolverSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".identity-resolver")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<ResolverSettings>,

    path: PathBuf,
}

impl SettingsManager {
    /// Load from the global settings file.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Load from a specific file. A missing file yields defaults.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &Path) -> Result<ResolverSettings> {
        if !path.exists() {
            tracing::debug!("[settings] No settings file at {:?}, using defaults", path);
            return Ok(ResolverSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let mut settings: ResolverSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);
        settings
            .resolver
            .validate()
            .context("Invalid [resolver] settings")?;

        tracing::info!("[settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut ResolverSettings) {
        fn resolve(value: &mut String) {
            if let Some(resolved) = resolve_env_ref(value) {
                *value = resolved;
            }
        }

        if let Some(filter) = settings.logging.filter.as_mut() {
            resolve(filter);
        }

        for account in settings.demo.accounts.iter_mut() {
            resolve(&mut account.email);
            resolve(&mut account.password);
        }
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> ResolverSettings {
        self.settings.read().await.clone()
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: ResolverSettings) -> Result<()> {
        new_settings
            .resolver
            .validate()
            .context("Invalid [resolver] settings")?;

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        *self.settings.write().await = new_settings;
        tracing::info!("[settings] Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Check if settings file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("[settings] Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let reference = trimmed.strip_prefix('$')?;

    let var_name = reference
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(reference);

    std::env::var(var_name).ok()
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting.as_ref().filter(|v| !v.is_empty()) {
        return Some(v.clone());
    }

    env_vars
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
        .or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_resolve_env_ref_dollar_format() {
        std::env::set_var("IDR_TEST_VAR_1", "test_value_1");

        assert_eq!(
            resolve_env_ref("$IDR_TEST_VAR_1"),
            Some("test_value_1".to_string())
        );

        std::env::remove_var("IDR_TEST_VAR_1");
    }

    #[test]
    fn test_resolve_env_ref_braces_format() {
        std::env::set_var("IDR_TEST_VAR_2", "test_value_2");

        assert_eq!(
            resolve_env_ref("${IDR_TEST_VAR_2}"),
            Some("test_value_2".to_string())
        );

        std::env::remove_var("IDR_TEST_VAR_2");
    }

    #[test]
    fn test_resolve_env_ref_no_match() {
        assert_eq!(resolve_env_ref("regular_value"), None);
        assert_eq!(resolve_env_ref("$NONEXISTENT_VAR_XYZ_12345"), None);
    }

    #[test]
    fn test_get_with_env_fallback_from_setting() {
        let setting = Some("from_settings".to_string());
        let result = get_with_env_fallback(&setting, &["IDR_SOME_VAR"], None);
        assert_eq!(result, Some("from_settings".to_string()));
    }

    #[test]
    fn test_get_with_env_fallback_from_env() {
        std::env::set_var("IDR_FALLBACK_TEST_VAR", "from_env");

        let result = get_with_env_fallback(&None, &["IDR_FALLBACK_TEST_VAR"], None);
        assert_eq!(result, Some("from_env".to_string()));

        std::env::remove_var("IDR_FALLBACK_TEST_VAR");
    }

    #[test]
    fn test_get_with_env_fallback_default() {
        let result = get_with_env_fallback(
            &None,
            &["IDR_NONEXISTENT_VAR_ABC"],
            Some("default_value".to_string()),
        );
        assert_eq!(result, Some("default_value".to_string()));
    }

    #[test]
    fn test_get_with_env_fallback_empty_setting() {
        std::env::set_var("IDR_EMPTY_SETTING_TEST", "from_env");

        // Empty string in setting should fall through to env var
        let setting = Some("".to_string());
        let result = get_with_env_fallback(&setting, &["IDR_EMPTY_SETTING_TEST"], None);
        assert_eq!(result, Some("from_env".to_string()));

        std::env::remove_var("IDR_EMPTY_SETTING_TEST");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert!(!manager.exists());
        let settings = manager.get().await;
        assert_eq!(settings.version, 1);
        assert_eq!(settings.resolver.read_timeout_ms, 3000);
    }

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        let mut settings = manager.get().await;
        settings.resolver.read_timeout_ms = 750;
        settings.demo.store_offline = true;
        manager.update(settings).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());

        let reopened = SettingsManager::with_path(&path).await.unwrap();
        let settings = reopened.get().await;
        assert_eq!(settings.resolver.read_timeout_ms, 750);
        assert!(settings.demo.store_offline);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_resolver_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        let mut settings = manager.get().await;
        settings.resolver.read_timeout_ms = 0;
        assert!(manager.update(settings).await.is_err());
        assert!(!manager.exists());
        assert_eq!(manager.get().await.resolver.read_timeout_ms, 3000);
    }

    #[tokio::test]
    async fn test_template_generation_and_env_interpolation() {
        std::env::set_var("DEMO_PASSWORD", "from-env");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        assert!(manager.ensure_settings_file().await.unwrap());
        assert!(!manager.ensure_settings_file().await.unwrap());

        manager.reload().await.unwrap();
        let settings = manager.get().await;
        assert_eq!(settings.demo.accounts.len(), 2);
        assert_eq!(settings.demo.accounts[0].password, "from-env");
        assert_eq!(settings.demo.accounts[0].role, Role::Vendor);
        assert!(!settings.demo.accounts[1].create_profile);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        tokio::fs::write(&path, "version = [").await.unwrap();

        assert!(SettingsManager::with_path(&path).await.is_err());
    }
}
