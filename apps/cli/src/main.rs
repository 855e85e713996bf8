//! Wisdom CLI: export knowledge articles to CSV for re-import.
//!
//! Pulls every article type, article and data category assignment from the
//! knowledge API and writes an import-ready tree of CSV, HTML and images.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
