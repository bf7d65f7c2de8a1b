// scrubsh/src/main.rs
//! scrubsh entry point.
//!
//! Parses the command line, sets up logging and runs the scrub.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use scrubsh::cli::Cli;
use scrubsh::logger;
use scrubsh::{run_scrub, ScrubOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // A local .env may carry SCRUBSH_TOKENIZATION; it must be loaded before
    // the shared tokenizer is first touched.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let level = if cli.quiet {
        Some(LevelFilter::Off)
    } else if cli.debug {
        Some(LevelFilter::Debug)
    } else {
        None
    };
    logger::init_logger(level);

    run_scrub(ScrubOptions::from(cli)).await
}
