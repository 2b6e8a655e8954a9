//! Lightweight REPL (Read-Eval-Print-Loop) for identity-cli.
//!
//! Provides an interactive mode when no command is provided via `-e` or `-f`.
//! Lines are resolver commands (see [`HELP`]); `/quit`, `/exit` and `/q` leave.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use super::bootstrap::CliContext;
use super::runner::execute_command;
use crate::models::Role;

pub const HELP: &str = "\
Commands:
  login <email> <password>                  Sign in with a password
  signup <email> <password> [role] [name]   Create an account (role: vendor | buyer)
  logout                                    Sign out
  whoami                                    Show the current identity
  status                                    Show engine diagnostics
  confirm <email>                           Confirm a pending sign-up
  refresh                                   Refresh the current session
  expire                                    End the session on the provider side
  oauth <provider>                          Start an OAuth sign-in
  /help                                     Show this help
  /quit                                     Exit";

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Login {
        email: String,
        password: String,
    },
    Signup {
        email: String,
        password: String,
        role: Option<Role>,
        name: Option<String>,
    },
    Logout,
    Whoami,
    Status,
    Confirm {
        email: String,
    },
    Refresh,
    Expire,
    Oauth {
        provider: String,
    },
    Help,
    /// Exit the REPL
    Quit,
    /// Known command with missing arguments; carries its usage line
    Usage(&'static str),
    /// Unknown command (will show help)
    Unknown(String),
    /// Empty input (skip)
    Empty,
}

impl ReplCommand {
    /// Parse user input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        if trimmed.starts_with('/') {
            return match trimmed.to_lowercase().as_str() {
                "/quit" | "/exit" | "/q" => ReplCommand::Quit,
                "/help" | "/h" | "/?" => ReplCommand::Help,
                _ => ReplCommand::Unknown(trimmed.to_string()),
            };
        }

        let mut words = trimmed.split_whitespace();
        let Some(verb) = words.next() else {
            return ReplCommand::Empty;
        };
        let rest: Vec<&str> = words.collect();

        match (verb.to_lowercase().as_str(), rest.as_slice()) {
            ("login", [email, password]) => ReplCommand::Login {
                email: email.to_string(),
                password: password.to_string(),
            },
            ("login", _) => ReplCommand::Usage("login <email> <password>"),
            ("signup", [email, password, extra @ ..]) => {
                let (role, name_words) = match extra.split_first() {
                    Some((first, tail)) if is_role(first) => (Some(Role::parse_lenient(first)), tail),
                    _ => (None, extra),
                };
                let name = (!name_words.is_empty()).then(|| name_words.join(" "));
                ReplCommand::Signup {
                    email: email.to_string(),
                    password: password.to_string(),
                    role,
                    name,
                }
            }
            ("signup", _) => ReplCommand::Usage("signup <email> <password> [role] [name]"),
            ("logout", []) => ReplCommand::Logout,
            ("whoami", []) => ReplCommand::Whoami,
            ("status", []) => ReplCommand::Status,
            ("confirm", [email]) => ReplCommand::Confirm {
                email: email.to_string(),
            },
            ("confirm", _) => ReplCommand::Usage("confirm <email>"),
            ("refresh", []) => ReplCommand::Refresh,
            ("expire", []) => ReplCommand::Expire,
            ("oauth", [provider]) => ReplCommand::Oauth {
                provider: provider.to_string(),
            },
            ("oauth", _) => ReplCommand::Usage("oauth <provider>"),
            ("help", []) => ReplCommand::Help,
            _ => ReplCommand::Unknown(trimmed.to_string()),
        }
    }
}

fn is_role(word: &str) -> bool {
    matches!(word.to_lowercase().as_str(), "vendor" | "buyer")
}

/// Run an interactive REPL session.
///
/// Returns when the user exits or on EOF (Ctrl+D).
pub async fn run_repl(ctx: &mut CliContext) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let interactive = atty::is(atty::Stream::Stdin);

    if interactive {
        eprintln!("identity-cli interactive mode");
        eprintln!("Type /help for commands, /quit to exit\n");
    }

    loop {
        if interactive {
            print!("> ");
            stdout.flush()?;
        }

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF (Ctrl+D)
            if interactive {
                eprintln!("\nGoodbye!");
            }
            break;
        }

        match ReplCommand::parse(&input) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => {
                if interactive {
                    eprintln!("Goodbye!");
                }
                break;
            }
            command => {
                if let Err(e) = execute_command(ctx, command).await {
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn parses_quit_commands() {
            assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
            assert_eq!(ReplCommand::parse("/exit"), ReplCommand::Quit);
            assert_eq!(ReplCommand::parse("/Q"), ReplCommand::Quit);
        }

        #[test]
        fn parses_unknown_slash_command() {
            assert_eq!(
                ReplCommand::parse("/tools"),
                ReplCommand::Unknown("/tools".to_string())
            );
        }

        #[test]
        fn parses_login() {
            assert_eq!(
                ReplCommand::parse("login vera@loom.test secret"),
                ReplCommand::Login {
                    email: "vera@loom.test".into(),
                    password: "secret".into(),
                }
            );
            assert_eq!(
                ReplCommand::parse("LOGIN vera@loom.test"),
                ReplCommand::Usage("login <email> <password>")
            );
        }

        #[test]
        fn parses_signup_with_role_and_name() {
            assert_eq!(
                ReplCommand::parse("signup ana@x.com pw Vendor Ana Weaver"),
                ReplCommand::Signup {
                    email: "ana@x.com".into(),
                    password: "pw".into(),
                    role: Some(Role::Vendor),
                    name: Some("Ana Weaver".into()),
                }
            );
        }

        #[test]
        fn parses_signup_name_without_role() {
            assert_eq!(
                ReplCommand::parse("signup ana@x.com pw Ana"),
                ReplCommand::Signup {
                    email: "ana@x.com".into(),
                    password: "pw".into(),
                    role: None,
                    name: Some("Ana".into()),
                }
            );
            assert_eq!(
                ReplCommand::parse("signup ana@x.com pw"),
                ReplCommand::Signup {
                    email: "ana@x.com".into(),
                    password: "pw".into(),
                    role: None,
                    name: None,
                }
            );
        }

        #[test]
        fn parses_argumentless_commands() {
            assert_eq!(ReplCommand::parse("logout"), ReplCommand::Logout);
            assert_eq!(ReplCommand::parse(" whoami "), ReplCommand::Whoami);
            assert_eq!(ReplCommand::parse("status\n"), ReplCommand::Status);
            assert_eq!(ReplCommand::parse("refresh"), ReplCommand::Refresh);
            assert_eq!(ReplCommand::parse("expire"), ReplCommand::Expire);
            assert_eq!(ReplCommand::parse("help"), ReplCommand::Help);
        }

        #[test]
        fn parses_confirm_and_oauth() {
            assert_eq!(
                ReplCommand::parse("confirm nia@x.com"),
                ReplCommand::Confirm {
                    email: "nia@x.com".into()
                }
            );
            assert_eq!(
                ReplCommand::parse("oauth google"),
                ReplCommand::Oauth {
                    provider: "google".into()
                }
            );
            assert_eq!(ReplCommand::parse("oauth"), ReplCommand::Usage("oauth <provider>"));
        }

        #[test]
        fn unknown_or_extra_arguments() {
            assert_eq!(
                ReplCommand::parse("logout now"),
                ReplCommand::Unknown("logout now".into())
            );
            assert_eq!(
                ReplCommand::parse("dance"),
                ReplCommand::Unknown("dance".into())
            );
        }

        #[test]
        fn parses_empty_input() {
            assert_eq!(ReplCommand::parse(""), ReplCommand::Empty);
            assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
            assert_eq!(ReplCommand::parse("\t\n"), ReplCommand::Empty);
        }
    }
}
