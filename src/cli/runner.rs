//! CLI execution runner.
//!
//! Runs resolver commands against the engine and the demo collaborators.

use std::path::Path;

use anyhow::{Context, Result};

use crate::engine::SignupData;
use crate::error::IdentityError;
use crate::models::IdentitySource;

use super::bootstrap::CliContext;
use super::output::{print_snapshot, print_status};
use super::repl::{ReplCommand, HELP};

/// Parse and run a single command line.
pub async fn execute_once(ctx: &mut CliContext, input: &str) -> Result<()> {
    match ReplCommand::parse(input) {
        ReplCommand::Empty | ReplCommand::Quit => Ok(()),
        command => execute_command(ctx, command).await,
    }
}

/// Run commands from a file, one per line.
///
/// Lines starting with `#` are treated as comments. Execution stops on the
/// first error.
pub async fn execute_batch(ctx: &mut CliContext, file_path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .with_context(|| format!("Failed to read command file: {}", file_path.display()))?;

    let commands: Vec<&str> = content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    if commands.is_empty() {
        anyhow::bail!("No commands found in file: {}", file_path.display());
    }

    let total = commands.len();
    for (i, command) in commands.iter().enumerate() {
        if ctx.args.verbose {
            eprintln!("[batch] [{}/{}] {}", i + 1, total, redact(command));
        }
        execute_once(ctx, command)
            .await
            .with_context(|| format!("Command {} of {} failed", i + 1, total))?;
    }

    Ok(())
}

pub async fn execute_command(ctx: &mut CliContext, command: ReplCommand) -> Result<()> {
    let json = ctx.args.json;

    match command {
        ReplCommand::Login { email, password } => {
            let snapshot = ctx.engine.login(&email, &password).await?;
            print_snapshot(&snapshot, json)
        }
        ReplCommand::Signup {
            email,
            password,
            role,
            name,
        } => {
            let data = SignupData {
                name,
                role,
                ..Default::default()
            };
            let result = ctx.engine.signup(&email, &password, data).await?;
            if result.confirmation_pending {
                eprintln!(
                    "Confirmation pending for {}: run `confirm {}` to continue",
                    email, email
                );
            }
            print_snapshot(&result.snapshot, json)
        }
        ReplCommand::Logout => {
            ctx.engine.logout().await;
            print_snapshot(&ctx.engine.snapshot(), json)
        }
        ReplCommand::Whoami => print_snapshot(&ctx.engine.snapshot(), json),
        ReplCommand::Status => {
            let status = ctx.engine.status().await?;
            print_status(&status, json)
        }
        ReplCommand::Confirm { email } => {
            let provider = ctx.provider.clone();
            wait_for_resolution(ctx, move || provider.confirm_email(&email).map(|_| ())).await?;
            print_snapshot(&ctx.engine.snapshot(), json)
        }
        ReplCommand::Refresh => {
            let provider = ctx.provider.clone();
            wait_for_resolution(ctx, move || {
                provider
                    .refresh_session()
                    .map(|_| ())
                    .ok_or(IdentityError::AuthRejected("No active session".into()))
            })
            .await?;
            print_snapshot(&ctx.engine.snapshot(), json)
        }
        ReplCommand::Expire => {
            ctx.provider.expire_session();
            // Let the engine observe the provider event before reporting
            ctx.engine.status().await?;
            print_snapshot(&ctx.engine.snapshot(), json)
        }
        ReplCommand::Oauth { provider } => {
            let redirect = ctx.engine.begin_oauth(&provider).await?;
            if json {
                println!("{}", serde_json::to_string(&redirect)?);
            } else {
                println!("Open {} to continue with {}", redirect.url, redirect.provider);
            }
            Ok(())
        }
        ReplCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ReplCommand::Usage(usage) => anyhow::bail!("Usage: {}", usage),
        ReplCommand::Unknown(input) => {
            anyhow::bail!("Unknown command: {} (type /help for commands)", input)
        }
        ReplCommand::Empty | ReplCommand::Quit => Ok(()),
    }
}

/// Trigger a provider-side session event and wait (bounded by the profile
/// timeouts) for the engine to publish a profile-derived identity.
async fn wait_for_resolution<F>(ctx: &CliContext, trigger: F) -> Result<()>
where
    F: FnOnce() -> crate::error::Result<()>,
{
    let mut snapshots = ctx.engine.subscribe();
    snapshots.mark_unchanged();
    trigger()?;

    let bound = ctx.settings.resolver.read_timeout() + ctx.settings.resolver.ensure_check_timeout();
    let settled = tokio::time::timeout(bound, async {
        while snapshots.changed().await.is_ok() {
            if snapshots.borrow_and_update().source == Some(IdentitySource::Profile) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if !settled {
        tracing::debug!("[cli] Profile not resolved within {}ms", bound.as_millis());
    }
    Ok(())
}

/// Hide the password argument of login/signup lines.
fn redact(command: &str) -> String {
    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        [verb, email, _password, rest @ ..]
            if verb.eq_ignore_ascii_case("login") || verb.eq_ignore_ascii_case("signup") =>
        {
            let mut line = format!("{} {} ****", verb, email);
            for word in rest {
                line.push(' ');
                line.push_str(word);
            }
            line
        }
        _ => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_passwords() {
        assert_eq!(redact("login vera@loom.test secret"), "login vera@loom.test ****");
        assert_eq!(
            redact("signup ana@x.com pw vendor Ana"),
            "signup ana@x.com **** vendor Ana"
        );
        assert_eq!(redact("whoami"), "whoami");
    }
}
