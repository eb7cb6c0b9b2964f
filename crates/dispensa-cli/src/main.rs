//! dispensa-cli: command-line client for the artifact cache server.
//! Argument definitions live in a shared module so tests exercise the
//! same surface as the binary.
#![deny(clippy::all, clippy::pedantic)]

mod args;
mod client;
mod handlers;
mod print;


use clap::Parser;

use args::{Cli, Commands};
use client::{CliError, build_ctx_from_cli};

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = build_ctx_from_cli(&cli)?;

    match cli.command {
        Commands::Get(cmd) => handlers::get(&ctx, cmd).await?,
        Commands::Save(cmd) => handlers::save(&ctx, cmd).await?,
        Commands::Load(cmd) => handlers::load(&ctx, cmd).await?,
        Commands::Associate(cmd) => handlers::associate(&ctx, cmd).await?,
        Commands::Stats => handlers::stats(&ctx).await?,
        Commands::Inspect(cmd) => handlers::inspect(&ctx, cmd).await?,
    }

    Ok(())
}
