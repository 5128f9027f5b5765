//! dailypapers CLI: daily ranked-paper digests filtered by interest.
//!
//! Collects a category's ranked listing for a date, hydrates metadata,
//! scores papers against configured interests, and writes a digest.

mod commands;
mod transport;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
