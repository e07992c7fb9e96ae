pub mod archive;
pub mod backup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod logger;
pub mod metadata;
pub mod restore;
pub mod space;

use anyhow::Result;
use clap::Parser;

const VERSION: &str = "v0.1.0";

pub fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    logger::init(cli.verbose);
    cli.execute()
}
