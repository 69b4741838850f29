//! helpforge CLI: build help output from TOC records and content groups.
//!
//! Inspects and merges table-of-contents files, writes format assemblers
//! for a single group, and runs complete builds from a `helpforge.toml`.

mod commands;

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
