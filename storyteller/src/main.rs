//! Bedtime storyteller.
//!
//! Interactive by default: describe a story, read it with its rubric scores,
//! then ask for changes until you type `end`.
//!
//! ```bash
//! cargo run -p storyteller
//! cargo run -p storyteller -- tell a story about a brave princess and a dragon
//! cargo run -p storyteller -- tell --json a story about Santa losing his sleigh
//! ```

mod cli;
mod session;

use anyhow::Context;
use clap::Parser;
use claude::Claude;
use storyteller_core::{Storyteller, StorytellerConfig};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli);

    let config = cli.apply(StorytellerConfig::from_env()?);
    let client = Claude::from_env()
        .context("ANTHROPIC_API_KEY is not set; put it in a .env file or export it")?
        .with_retry_policy(config.retry_policy());
    tracing::debug!(?config, "configuration loaded");

    let teller = Storyteller::new(client, &config);
    match cli.command {
        Some(Commands::Tell { request, json }) => {
            session::tell_once(teller, &request.join(" "), json).await
        }
        None => session::run_interactive(teller).await,
    }
}

/// Logs go to stderr so stories on stdout stay clean.
fn init_tracing(cli: &Cli) {
    let filter = match cli.log_filter() {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
