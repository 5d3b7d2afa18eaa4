//! Tessera - headless tools for recorded painting sessions

mod cli;
mod commands;
mod config;
mod logging;

use clap::Parser;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Index { recording } => commands::index(&recording, &config),
        Command::Info { recording } => commands::info(&recording),
        Command::Render {
            recording,
            at,
            output,
            build_index,
        } => commands::render(&recording, at, &output, build_index, &config),
    }
}
