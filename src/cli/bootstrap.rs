//! CLI bootstrap - wire settings, logging, collaborators and the engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::engine::{EngineHandle, ResolutionEngine};
use crate::models::{default_display_name, ProfileRecord};
use crate::provider::{MemoryAuthProvider, SessionClaims};
use crate::settings::{get_with_env_fallback, DemoAccount, ResolverSettings, SettingsManager};
use crate::store::MemoryProfileStore;

use super::args::Args;
use super::output::run_event_loop;

/// Everything a CLI command needs.
pub struct CliContext {
    pub engine: EngineHandle,

    /// Kept concrete so commands can drive provider-side events
    pub provider: Arc<MemoryAuthProvider>,

    pub store: Arc<MemoryProfileStore>,

    pub settings: ResolverSettings,

    /// Renders identity events until the engine goes away
    output: JoinHandle<Result<()>>,

    pub args: Args,
}

impl CliContext {
    /// Stop the engine and let the output loop drain.
    pub async fn shutdown(self) -> Result<()> {
        let CliContext { engine, output, .. } = self;

        engine.shutdown().await;
        // The last event sender goes with the handle, which closes the output loop
        drop(engine);

        match output.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("[cli] Output handler panicked: {}", e);
                Ok(())
            }
        }
    }
}

/// Initialize the CLI context.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("[cli] Failed to load .env file: {}", e);
        }
    }

    let settings_manager = match &args.settings {
        Some(path) => SettingsManager::with_path(path).await,
        None => SettingsManager::new().await,
    }
    .context("Failed to initialize settings manager")?;

    let settings = settings_manager.get().await;
    init_logging(args, &settings)?;

    // First run: write a commented template next to the defaults
    if args.settings.is_none() {
        if let Err(e) = settings_manager.ensure_settings_file().await {
            tracing::warn!("[cli] Failed to create settings template: {}", e);
        }
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
    }

    let provider = Arc::new(
        MemoryAuthProvider::new()
            .with_email_confirmation(args.confirm_email || settings.demo.require_email_confirmation),
    );
    provider.set_sign_out_delay(Duration::from_millis(settings.demo.sign_out_delay_ms));

    let store = Arc::new(MemoryProfileStore::new());
    let latency_ms = args.store_latency_ms.unwrap_or(settings.demo.store_latency_ms);
    store.set_latency(Duration::from_millis(latency_ms));
    store.set_offline(args.store_offline || settings.demo.store_offline);

    let seeded = seed_accounts(&provider, &store, &settings.demo.accounts);
    if args.verbose {
        eprintln!(
            "[cli] Seeded {} account(s), {} profile(s)",
            seeded,
            store.len()
        );
    }

    let engine = ResolutionEngine::spawn(provider.clone(), store.clone(), settings.resolver.clone());
    let events = engine.events();
    let json_mode = args.json;
    let output = tokio::spawn(async move { run_event_loop(events, json_mode).await });

    Ok(CliContext {
        engine,
        provider,
        store,
        settings,
        output,
        args: args.clone(),
    })
}

/// Install the tracing subscriber. `--verbose` wins over settings.
fn init_logging(args: &Args, settings: &ResolverSettings) -> Result<()> {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(
            "identity_resolver=debug"
                .parse()
                .context("Invalid log directive")?,
        )
    } else if let Some(directive) =
        get_with_env_fallback(&settings.logging.filter, &["IDENTITY_RESOLVER_LOG"], None)
    {
        EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log filter '{}'", directive))?
    } else {
        EnvFilter::from_default_env().add_directive(
            format!("identity_resolver={}", settings.logging.level)
                .parse()
                .with_context(|| format!("Invalid log level '{}'", settings.logging.level))?,
        )
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

/// Register demo accounts with the provider and, where asked, their profiles.
///
/// Returns the number of accounts registered. Accounts without an email or
/// password are skipped.
pub fn seed_accounts(
    provider: &MemoryAuthProvider,
    store: &MemoryProfileStore,
    accounts: &[DemoAccount],
) -> usize {
    let mut seeded = 0;
    for account in accounts {
        let email = account.email.trim();
        if email.is_empty() || account.password.is_empty() {
            tracing::warn!("[cli] Skipping demo account without email or password");
            continue;
        }

        let claims = SessionClaims {
            full_name: account.full_name.clone(),
            role: Some(account.role.as_str().to_string()),
            company_name: account.company_name.clone(),
            phone: account.phone.clone(),
        };
        let user_id = provider.add_account(email, &account.password, claims);

        if account.create_profile {
            store.put(ProfileRecord {
                id: user_id.clone(),
                email: email.to_string(),
                full_name: account
                    .full_name
                    .clone()
                    .unwrap_or_else(|| default_display_name(email)),
                role: account.role,
                company_name: account.company_name.clone(),
                phone: account.phone.clone(),
                created_at: chrono::Utc::now(),
            });
        }

        tracing::debug!("[cli] Seeded {} as {}", email, user_id);
        seeded += 1;
    }
    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn account(email: &str, role: Role, create_profile: bool) -> DemoAccount {
        DemoAccount {
            email: email.to_string(),
            password: "secret".to_string(),
            full_name: None,
            role,
            company_name: None,
            phone: None,
            create_profile,
        }
    }

    #[test]
    fn test_seed_accounts() {
        let provider = MemoryAuthProvider::new();
        let store = MemoryProfileStore::new();

        let seeded = seed_accounts(
            &provider,
            &store,
            &[
                account("vera@loom.test", Role::Vendor, true),
                account("ben@loom.test", Role::Buyer, false),
                account("  ", Role::Buyer, true),
            ],
        );

        assert_eq!(seeded, 2);
        assert!(provider.has_account("vera@loom.test"));
        assert!(provider.has_account("ben@loom.test"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_profile_resolves_on_login() {
        let provider = Arc::new(MemoryAuthProvider::new());
        let store = Arc::new(MemoryProfileStore::new());
        seed_accounts(&provider, &store, &[account("vera@loom.test", Role::Vendor, true)]);

        let engine = ResolutionEngine::spawn(
            provider.clone(),
            store.clone(),
            crate::config::ResolverConfig::default(),
        );
        let snapshot = engine.login("vera@loom.test", "secret").await.unwrap();

        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.name, "vera");
        assert_eq!(identity.role, Role::Vendor);
        engine.shutdown().await;
    }
}
