//! identity-cli - drive the identity resolver from a terminal
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --bin identity-cli
//!
//! # Run a single command
//! ./target/debug/identity-cli -e "login vera@loom.test secret"
//!
//! # Slow profile store: watch the claims identity land first
//! ./target/debug/identity-cli --store-latency-ms 1500
//!
//! # JSON event lines for scripting
//! ./target/debug/identity-cli -f session.txt --json | jq .
//!
//! # Interactive REPL mode (when no -e or -f provided)
//! ./target/debug/identity-cli
//! ```

use anyhow::Result;
use clap::Parser;

use identity_resolver::cli::{execute_batch, execute_once, initialize, run_repl, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut ctx = initialize(&args).await?;

    let result = if let Some(ref command) = args.execute {
        execute_once(&mut ctx, command).await
    } else if let Some(ref file) = args.file {
        execute_batch(&mut ctx, file).await
    } else {
        run_repl(&mut ctx).await
    };

    ctx.shutdown().await?;

    result
}
