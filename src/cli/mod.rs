//! Demo command-line interface for the identity resolver.
//!
//! Runs the resolution engine against the in-memory provider and profile
//! store, so every behavior (claims-first publish, enrichment, slow or
//! offline stores, non-blocking logout) can be driven by hand or by script.
//!
//! ```text
//! +-------------+     +------------------+     +---------------+
//! | runner.rs   | --> | EngineHandle     | --> | output.rs     |
//! | (commands)  |     | (events stream)  |     | (print/JSON)  |
//! +-------------+     +------------------+     +---------------+
//! ```
//!
//! # REPL Mode
//!
//! When no command is provided via `-e` or `-f`, the CLI enters
//! interactive REPL mode. See `repl.rs` for details.

mod args;
mod bootstrap;
mod output;
mod repl;
mod runner;

pub use args::Args;
pub use bootstrap::{initialize, seed_accounts, CliContext};
pub use output::{format_event, run_event_loop};
pub use repl::{run_repl, ReplCommand};
pub use runner::{execute_batch, execute_command, execute_once};
