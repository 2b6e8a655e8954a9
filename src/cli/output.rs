//! CLI output handling - identity event loop and snapshot rendering.

use std::io::{self, Write};

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::engine::{EngineStatus, IdentityEvent, IdentitySnapshot};
use crate::models::{Identity, IdentitySource};

/// Print identity events until the engine's event stream closes.
///
/// # Arguments
///
/// * `events` - Engine event receiver
/// * `json_mode` - If true, output events as JSON lines
pub async fn run_event_loop(
    mut events: broadcast::Receiver<IdentityEvent>,
    json_mode: bool,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(event) => {
                if json_mode {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    eprintln!("{}", format_event(&event));
                }
                io::stdout().flush()?;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("[cli] Output fell behind, skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    Ok(())
}

/// One-line description of an event for terminal output.
pub fn format_event(event: &IdentityEvent) -> String {
    match event {
        IdentityEvent::Resolved {
            identity,
            source,
            generation,
        } => format!(
            "[identity] {} via {} (g{})",
            describe_identity(identity),
            source_label(*source),
            generation
        ),
        IdentityEvent::SignedOut { generation } => {
            format!("[identity] signed out (g{})", generation)
        }
        IdentityEvent::LoadingSettled => "[identity] loading settled".to_string(),
    }
}

pub fn print_snapshot(snapshot: &IdentitySnapshot, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    match (&snapshot.identity, snapshot.source) {
        (Some(identity), Some(source)) => {
            println!("{} via {}", describe_identity(identity), source_label(source))
        }
        (Some(identity), None) => println!("{}", describe_identity(identity)),
        (None, _) if snapshot.loading => println!("(resolving)"),
        (None, _) => println!("(signed out)"),
    }
    Ok(())
}

pub fn print_status(status: &EngineStatus, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(status)?);
    } else {
        println!(
            "generation={} phase={:?} authenticated={} logging_out={} sign_outs_in_flight={}",
            status.generation,
            status.phase,
            status.authenticated,
            status.logging_out,
            status.sign_outs_in_flight
        );
    }
    Ok(())
}

fn describe_identity(identity: &Identity) -> String {
    let mut line = format!(
        "{} <{}> [{}] id={}",
        identity.name, identity.email, identity.role, identity.id
    );
    if let Some(company) = &identity.company_name {
        line.push_str(&format!(" company={:?}", company));
    }
    line
}

fn source_label(source: IdentitySource) -> &'static str {
    match source {
        IdentitySource::Claims => "claims",
        IdentitySource::Profile => "profile",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn identity() -> Identity {
        Identity {
            id: "u1".into(),
            email: "vera@loom.test".into(),
            name: "Vera Loom".into(),
            role: Role::Vendor,
            company_name: Some("Loom Supply".into()),
            phone: None,
        }
    }

    #[test]
    fn test_format_resolved_event() {
        let line = format_event(&IdentityEvent::Resolved {
            identity: identity(),
            source: IdentitySource::Profile,
            generation: 3,
        });
        assert_eq!(
            line,
            "[identity] Vera Loom <vera@loom.test> [vendor] id=u1 company=\"Loom Supply\" via profile (g3)"
        );
    }

    #[test]
    fn test_format_signed_out_event() {
        assert_eq!(
            format_event(&IdentityEvent::SignedOut { generation: 7 }),
            "[identity] signed out (g7)"
        );
        assert_eq!(
            format_event(&IdentityEvent::LoadingSettled),
            "[identity] loading settled"
        );
    }

    #[tokio::test]
    async fn test_event_loop_exits_when_stream_closes() {
        let (tx, rx) = broadcast::channel(8);
        let output = tokio::spawn(run_event_loop(rx, true));

        tx.send(IdentityEvent::LoadingSettled).unwrap();
        drop(tx);

        output.await.unwrap().unwrap();
    }
}
